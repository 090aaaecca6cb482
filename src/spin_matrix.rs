//! The spin-block matrix type underlying the whole engine.
//!
//! A spin-full operator on N Wannier orbitals is a 2N x 2N matrix over the
//! spinor basis. Two physical situations get two storage layouts:
//!
//! - [`SpinLayout::Collinear`]: the operator is block-diagonal in spin, so
//!   only the up-up and down-down N x N blocks are stored, side by side in
//!   one N x 2N buffer `[U | D]`. The off-diagonal spin blocks are
//!   implicitly zero, and every kernel working on a collinear matrix runs
//!   on half-sized blocks.
//! - [`SpinLayout::NonCollinear`]: the full 2N x 2N buffer, ordered so that
//!   rows/columns 0..N address the up sub-basis and N..2N the down
//!   sub-basis. Upstream codes interleave up/down per orbital; conversion
//!   happens once at ingest via [`SpinBlockMatrix::from_interleaved`].
//!
//! The layout is fixed at construction. Atom-indexed views return
//! spin-correctly-blocked submatrices regardless of layout.

use crate::atom_struct::Atom;
use crate::error::{ExchangeError, Result};
use ndarray::linalg::general_mat_mul;
use ndarray::prelude::*;
use ndarray::{CowArray, Zip};
use num_complex::Complex;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Sub};

/// Physical storage layout of a spin-full operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpinLayout {
    /// Spin-diagonal operator, stored as `[U | D]` in an N x 2N buffer.
    Collinear,
    /// Full spinor operator, stored de-interleaved in a 2N x 2N buffer.
    NonCollinear,
}

/// Spin-pair selector for atom-indexed views.
///
/// `Up` and `Down` are aliases of `UU` and `DD` for matrix views; they
/// exist so call sites can name the propagator channel they mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinSel {
    UU,
    DD,
    UD,
    DU,
    Up,
    Down,
    All,
}

/// Eigenvalue vector of a spin-block matrix: length 2N, first half up,
/// second half down (collinear), or globally sorted (non-collinear).
pub type MagneticVector = Array1<f64>;

/// Dense complex matrix with a spin-block layout tag.
#[derive(Debug, Clone, PartialEq)]
pub struct SpinBlockMatrix {
    layout: SpinLayout,
    norb: usize,
    data: Array2<Complex<f64>>,
}

#[inline(always)]
fn adjoint_block(mut dst: ArrayViewMut2<Complex<f64>>, src: ArrayView2<Complex<f64>>) {
    for ((i, j), v) in dst.indexed_iter_mut() {
        *v = src[(j, i)].conj();
    }
}

impl SpinBlockMatrix {
    /// Zero matrix of the given layout over `norb` up-spin orbitals.
    pub fn new(layout: SpinLayout, norb: usize) -> SpinBlockMatrix {
        let data = match layout {
            SpinLayout::Collinear => Array2::zeros((norb, 2 * norb)),
            SpinLayout::NonCollinear => Array2::zeros((2 * norb, 2 * norb)),
        };
        SpinBlockMatrix { layout, norb, data }
    }

    /// Collinear matrix from its up-up and down-down blocks.
    pub fn from_updown(u: Array2<Complex<f64>>, d: Array2<Complex<f64>>) -> Result<SpinBlockMatrix> {
        let n = u.nrows();
        if u.ncols() != n {
            return Err(ExchangeError::ShapeMismatch {
                context: "from_updown up block",
                expected: n,
                found: u.ncols(),
            });
        }
        if d.nrows() != n || d.ncols() != n {
            return Err(ExchangeError::ShapeMismatch {
                context: "from_updown down block",
                expected: n,
                found: d.nrows(),
            });
        }
        let mut out = SpinBlockMatrix::new(SpinLayout::Collinear, n);
        out.up_mut().assign(&u);
        out.down_mut().assign(&d);
        Ok(out)
    }

    /// Non-collinear matrix from an already de-interleaved 2N x 2N buffer.
    pub fn from_dense(m: Array2<Complex<f64>>) -> Result<SpinBlockMatrix> {
        let nsta = m.nrows();
        if m.ncols() != nsta || nsta % 2 != 0 {
            return Err(ExchangeError::ShapeMismatch {
                context: "from_dense",
                expected: nsta + nsta % 2,
                found: m.ncols(),
            });
        }
        Ok(SpinBlockMatrix {
            layout: SpinLayout::NonCollinear,
            norb: nsta / 2,
            data: m,
        })
    }

    /// Non-collinear matrix from the upstream interleaved convention,
    /// where orbital i carries rows/columns 2i (up) and 2i+1 (down).
    pub fn from_interleaved(m: &Array2<Complex<f64>>) -> Result<SpinBlockMatrix> {
        let nsta = m.nrows();
        if m.ncols() != nsta || nsta % 2 != 0 {
            return Err(ExchangeError::ShapeMismatch {
                context: "from_interleaved",
                expected: nsta + nsta % 2,
                found: m.ncols(),
            });
        }
        let n = nsta / 2;
        let mut out = SpinBlockMatrix::new(SpinLayout::NonCollinear, n);
        for i in 0..n {
            for j in 0..n {
                out.data[[i, j]] = m[[2 * i, 2 * j]];
                out.data[[n + i, n + j]] = m[[2 * i + 1, 2 * j + 1]];
                out.data[[i, n + j]] = m[[2 * i, 2 * j + 1]];
                out.data[[n + i, j]] = m[[2 * i + 1, 2 * j]];
            }
        }
        Ok(out)
    }

    /// Inverse of [`from_interleaved`](Self::from_interleaved); collinear
    /// matrices interleave with zero off-diagonal spin entries.
    pub fn to_interleaved(&self) -> Array2<Complex<f64>> {
        let n = self.norb;
        let mut m = Array2::zeros((2 * n, 2 * n));
        let uu = self.up();
        let dd = self.down();
        let ud = self.up_down();
        let du = self.down_up();
        for i in 0..n {
            for j in 0..n {
                m[[2 * i, 2 * j]] = uu[[i, j]];
                m[[2 * i + 1, 2 * j + 1]] = dd[[i, j]];
                m[[2 * i, 2 * j + 1]] = ud[[i, j]];
                m[[2 * i + 1, 2 * j]] = du[[i, j]];
            }
        }
        m
    }

    /// De-interleaved dense 2N x 2N form, whatever the layout.
    pub fn to_dense(&self) -> Array2<Complex<f64>> {
        let n = self.norb;
        let mut m = Array2::zeros((2 * n, 2 * n));
        m.slice_mut(s![..n, ..n]).assign(&self.up());
        m.slice_mut(s![n.., n..]).assign(&self.down());
        m.slice_mut(s![..n, n..]).assign(&self.up_down());
        m.slice_mut(s![n.., ..n]).assign(&self.down_up());
        m
    }

    #[inline(always)]
    pub fn layout(&self) -> SpinLayout {
        self.layout
    }

    #[inline(always)]
    pub fn norb(&self) -> usize {
        self.norb
    }

    #[inline(always)]
    pub fn nsta(&self) -> usize {
        2 * self.norb
    }

    #[inline(always)]
    pub(crate) fn storage(&self) -> &Array2<Complex<f64>> {
        &self.data
    }

    #[inline(always)]
    pub(crate) fn storage_mut(&mut self) -> &mut Array2<Complex<f64>> {
        &mut self.data
    }

    #[inline(always)]
    pub fn up(&self) -> ArrayView2<Complex<f64>> {
        let n = self.norb;
        match self.layout {
            SpinLayout::Collinear => self.data.slice(s![.., ..n]),
            SpinLayout::NonCollinear => self.data.slice(s![..n, ..n]),
        }
    }

    #[inline(always)]
    pub fn down(&self) -> ArrayView2<Complex<f64>> {
        let n = self.norb;
        match self.layout {
            SpinLayout::Collinear => self.data.slice(s![.., n..]),
            SpinLayout::NonCollinear => self.data.slice(s![n.., n..]),
        }
    }

    #[inline(always)]
    pub fn up_mut(&mut self) -> ArrayViewMut2<Complex<f64>> {
        let n = self.norb;
        match self.layout {
            SpinLayout::Collinear => self.data.slice_mut(s![.., ..n]),
            SpinLayout::NonCollinear => self.data.slice_mut(s![..n, ..n]),
        }
    }

    #[inline(always)]
    pub fn down_mut(&mut self) -> ArrayViewMut2<Complex<f64>> {
        let n = self.norb;
        match self.layout {
            SpinLayout::Collinear => self.data.slice_mut(s![.., n..]),
            SpinLayout::NonCollinear => self.data.slice_mut(s![n.., n..]),
        }
    }

    /// Up-down spin block; a zero matrix for collinear layouts.
    pub fn up_down(&self) -> CowArray<Complex<f64>, Ix2> {
        let n = self.norb;
        match self.layout {
            SpinLayout::Collinear => Array2::zeros((n, n)).into(),
            SpinLayout::NonCollinear => self.data.slice(s![..n, n..]).into(),
        }
    }

    /// Down-up spin block; a zero matrix for collinear layouts.
    pub fn down_up(&self) -> CowArray<Complex<f64>, Ix2> {
        let n = self.norb;
        match self.layout {
            SpinLayout::Collinear => Array2::zeros((n, n)).into(),
            SpinLayout::NonCollinear => self.data.slice(s![n.., ..n]).into(),
        }
    }

    /// Submatrix over atom `a`'s orbitals (rows) and atom `b`'s orbitals
    /// (columns), in the spin channel selected by `sel`.
    ///
    /// Both atoms must carry an orbital window inside 0..N. `All` stacks
    /// the four spin blocks into an owned 2n_a x 2n_b matrix.
    pub fn atom_view(&self, a: &Atom, b: &Atom, sel: SpinSel) -> Result<CowArray<Complex<f64>, Ix2>> {
        let n = self.norb;
        let ra = a.uprange().ok_or(ExchangeError::ShapeMismatch {
            context: "atom_view row atom without orbital window",
            expected: 1,
            found: 0,
        })?;
        let rb = b.uprange().ok_or(ExchangeError::ShapeMismatch {
            context: "atom_view col atom without orbital window",
            expected: 1,
            found: 0,
        })?;
        if ra.end > n || rb.end > n {
            return Err(ExchangeError::ShapeMismatch {
                context: "atom_view orbital window out of basis",
                expected: n,
                found: ra.end.max(rb.end),
            });
        }
        let view = match (sel, self.layout) {
            (SpinSel::UU | SpinSel::Up, SpinLayout::Collinear) => {
                self.data.slice(s![ra, rb]).into()
            }
            (SpinSel::UU | SpinSel::Up, SpinLayout::NonCollinear) => {
                self.data.slice(s![ra, rb]).into()
            }
            (SpinSel::DD | SpinSel::Down, SpinLayout::Collinear) => self
                .data
                .slice(s![ra, n + rb.start..n + rb.end])
                .into(),
            (SpinSel::DD | SpinSel::Down, SpinLayout::NonCollinear) => self
                .data
                .slice(s![n + ra.start..n + ra.end, n + rb.start..n + rb.end])
                .into(),
            (SpinSel::UD, SpinLayout::Collinear) | (SpinSel::DU, SpinLayout::Collinear) => {
                Array2::zeros((ra.len(), rb.len())).into()
            }
            (SpinSel::UD, SpinLayout::NonCollinear) => self
                .data
                .slice(s![ra, n + rb.start..n + rb.end])
                .into(),
            (SpinSel::DU, SpinLayout::NonCollinear) => self
                .data
                .slice(s![n + ra.start..n + ra.end, rb])
                .into(),
            (SpinSel::All, _) => {
                let (na, nb) = (ra.len(), rb.len());
                let mut m = Array2::zeros((2 * na, 2 * nb));
                m.slice_mut(s![..na, ..nb])
                    .assign(&self.atom_view(a, b, SpinSel::UU)?);
                m.slice_mut(s![na.., nb..])
                    .assign(&self.atom_view(a, b, SpinSel::DD)?);
                m.slice_mut(s![..na, nb..])
                    .assign(&self.atom_view(a, b, SpinSel::UD)?);
                m.slice_mut(s![na.., ..nb])
                    .assign(&self.atom_view(a, b, SpinSel::DU)?);
                m.into()
            }
        };
        Ok(view)
    }

    /// out <- a . b, dispatched on the layout: two half-sized GEMMs for
    /// collinear operands, one dense 2N GEMM otherwise. All three matrices
    /// must share layout and dimension.
    pub fn multiply(out: &mut SpinBlockMatrix, a: &SpinBlockMatrix, b: &SpinBlockMatrix) -> Result<()> {
        if a.layout != b.layout || a.layout != out.layout {
            return Err(ExchangeError::LayoutMismatch { op: "multiply" });
        }
        if a.norb != b.norb {
            return Err(ExchangeError::ShapeMismatch {
                context: "multiply operands",
                expected: a.norb,
                found: b.norb,
            });
        }
        if a.norb != out.norb {
            return Err(ExchangeError::ShapeMismatch {
                context: "multiply output",
                expected: a.norb,
                found: out.norb,
            });
        }
        let one = Complex::new(1.0, 0.0);
        let zero = Complex::new(0.0, 0.0);
        match a.layout {
            SpinLayout::Collinear => {
                general_mat_mul(one, &a.up(), &b.up(), zero, &mut out.up_mut());
                general_mat_mul(one, &a.down(), &b.down(), zero, &mut out.down_mut());
            }
            SpinLayout::NonCollinear => {
                let (av, bv) = (a.data.view(), b.data.view());
                general_mat_mul(one, &av, &bv, zero, &mut out.data.view_mut());
            }
        }
        Ok(())
    }

    /// out <- src^dagger, preserving the block semantics of the layout.
    pub fn adjoint_into(out: &mut SpinBlockMatrix, src: &SpinBlockMatrix) -> Result<()> {
        if src.layout != out.layout {
            return Err(ExchangeError::LayoutMismatch { op: "adjoint_into" });
        }
        if src.norb != out.norb {
            return Err(ExchangeError::ShapeMismatch {
                context: "adjoint_into",
                expected: src.norb,
                found: out.norb,
            });
        }
        match src.layout {
            SpinLayout::Collinear => {
                adjoint_block(out.up_mut(), src.up());
                adjoint_block(out.down_mut(), src.down());
            }
            SpinLayout::NonCollinear => {
                adjoint_block(out.data.view_mut(), src.data.view());
            }
        }
        Ok(())
    }

    /// self <- self + alpha * rhs.
    pub fn scaled_add(&mut self, alpha: Complex<f64>, rhs: &SpinBlockMatrix) -> Result<()> {
        if self.layout != rhs.layout {
            return Err(ExchangeError::LayoutMismatch { op: "scaled_add" });
        }
        if self.norb != rhs.norb {
            return Err(ExchangeError::ShapeMismatch {
                context: "scaled_add",
                expected: self.norb,
                found: rhs.norb,
            });
        }
        self.data.zip_mut_with(&rhs.data, |x, y| *x += alpha * y);
        Ok(())
    }

    /// Reset every stored entry to zero.
    pub fn set_zero(&mut self) {
        self.data.fill(Complex::zero());
    }

    /// Element-wise combination of two same-layout matrices; the one
    /// dispatch point behind the operator impls.
    pub fn binary_op<F>(a: &SpinBlockMatrix, b: &SpinBlockMatrix, op: F) -> Result<SpinBlockMatrix>
    where
        F: Fn(Complex<f64>, Complex<f64>) -> Complex<f64>,
    {
        if a.layout != b.layout {
            return Err(ExchangeError::LayoutMismatch { op: "binary_op" });
        }
        if a.norb != b.norb {
            return Err(ExchangeError::ShapeMismatch {
                context: "binary_op",
                expected: a.norb,
                found: b.norb,
            });
        }
        let data = Zip::from(&a.data).and(&b.data).map_collect(|x, y| op(*x, *y));
        Ok(SpinBlockMatrix {
            layout: a.layout,
            norb: a.norb,
            data,
        })
    }
}

macro_rules! impl_elementwise_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait for &SpinBlockMatrix {
            type Output = SpinBlockMatrix;
            fn $method(self, rhs: &SpinBlockMatrix) -> SpinBlockMatrix {
                SpinBlockMatrix::binary_op(self, rhs, |x, y| x $op y)
                    .expect(concat!("spin-layout mismatch in '", stringify!($op), "'"))
            }
        }
    };
}

impl_elementwise_op!(Add, add, +);
impl_elementwise_op!(Sub, sub, -);
impl_elementwise_op!(Mul, mul, *);
impl_elementwise_op!(Div, div, /);

impl Mul<Complex<f64>> for &SpinBlockMatrix {
    type Output = SpinBlockMatrix;
    fn mul(self, rhs: Complex<f64>) -> SpinBlockMatrix {
        SpinBlockMatrix {
            layout: self.layout,
            norb: self.norb,
            data: self.data.mapv(|x| x * rhs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom_struct::Atom;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn c(re: f64, im: f64) -> Complex<f64> {
        Complex::new(re, im)
    }

    fn atoms_2x1() -> (Atom, Atom) {
        let a = Atom::new("A", array![0.0, 0.0, 0.0], Some(0..1));
        let b = Atom::new("B", array![1.0, 0.0, 0.0], Some(1..2));
        (a, b)
    }

    #[test]
    fn collinear_offdiagonal_spin_blocks_are_zero() {
        let u = array![[c(1.0, 0.0), c(2.0, 0.5)], [c(2.0, -0.5), c(3.0, 0.0)]];
        let d = array![[c(4.0, 0.0), c(0.0, 1.0)], [c(0.0, -1.0), c(5.0, 0.0)]];
        let m = SpinBlockMatrix::from_updown(u, d).unwrap();
        let (a, b) = atoms_2x1();
        for sel in [SpinSel::UD, SpinSel::DU] {
            let v = m.atom_view(&a, &b, sel).unwrap();
            assert!(v.iter().all(|z| z.norm() == 0.0));
        }
        assert!(m.up_down().iter().all(|z| z.norm() == 0.0));
        assert!(m.down_up().iter().all(|z| z.norm() == 0.0));
    }

    #[test]
    fn interleaved_round_trip() {
        let n = 3;
        let m = Array2::from_shape_fn((2 * n, 2 * n), |(i, j)| {
            c(i as f64 + 0.1 * j as f64, (i * j) as f64 * 0.01)
        });
        let sb = SpinBlockMatrix::from_interleaved(&m).unwrap();
        assert_eq!(sb.layout(), SpinLayout::NonCollinear);
        let back = sb.to_interleaved();
        assert_abs_diff_eq!(
            back.mapv(|z| z.norm()).sum(),
            m.mapv(|z| z.norm()).sum(),
            epsilon = 1e-12
        );
        assert!(back
            .iter()
            .zip(m.iter())
            .all(|(x, y)| (x - y).norm() < 1e-14));
    }

    #[test]
    fn from_interleaved_rejects_odd_dimension() {
        let m = Array2::<Complex<f64>>::zeros((3, 3));
        assert!(matches!(
            SpinBlockMatrix::from_interleaved(&m),
            Err(ExchangeError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn interleaved_identity_splits_into_identity_blocks() {
        let m = Array2::from_diag(&Array1::from_elem(4, c(1.0, 0.0)));
        let sb = SpinBlockMatrix::from_interleaved(&m).unwrap();
        assert!(sb.up().iter().zip(Array2::eye(2).iter()).all(
            |(z, e): (&Complex<f64>, &f64)| (z - c(*e, 0.0)).norm() < 1e-15
        ));
        assert!(sb.down().iter().zip(Array2::eye(2).iter()).all(
            |(z, e): (&Complex<f64>, &f64)| (z - c(*e, 0.0)).norm() < 1e-15
        ));
        assert!(sb.up_down().iter().all(|z| z.norm() == 0.0));
        assert!(sb.down_up().iter().all(|z| z.norm() == 0.0));
    }

    #[test]
    fn adjoint_is_an_involution() {
        let m = Array2::from_shape_fn((4, 4), |(i, j)| c(i as f64 - j as f64, 0.3 * (i + j) as f64));
        let sb = SpinBlockMatrix::from_dense(m).unwrap();
        let mut adj = SpinBlockMatrix::new(SpinLayout::NonCollinear, 2);
        let mut back = SpinBlockMatrix::new(SpinLayout::NonCollinear, 2);
        SpinBlockMatrix::adjoint_into(&mut adj, &sb).unwrap();
        SpinBlockMatrix::adjoint_into(&mut back, &adj).unwrap();
        assert!(back
            .storage()
            .iter()
            .zip(sb.storage().iter())
            .all(|(x, y)| (x - y).norm() < 1e-14));
    }

    #[test]
    fn collinear_multiply_matches_blockwise_dense() {
        let u1 = array![[c(1.0, 0.0), c(0.0, 1.0)], [c(2.0, 0.0), c(1.0, -1.0)]];
        let d1 = array![[c(0.5, 0.0), c(1.0, 0.0)], [c(0.0, 0.0), c(2.0, 0.0)]];
        let u2 = array![[c(0.0, 1.0), c(1.0, 0.0)], [c(1.0, 0.0), c(0.0, 0.0)]];
        let d2 = array![[c(1.0, 0.0), c(0.0, 0.0)], [c(3.0, 0.0), c(1.0, 0.0)]];
        let a = SpinBlockMatrix::from_updown(u1.clone(), d1.clone()).unwrap();
        let b = SpinBlockMatrix::from_updown(u2.clone(), d2.clone()).unwrap();
        let mut out = SpinBlockMatrix::new(SpinLayout::Collinear, 2);
        SpinBlockMatrix::multiply(&mut out, &a, &b).unwrap();
        let ref_u = u1.dot(&u2);
        let ref_d = d1.dot(&d2);
        assert!(out
            .up()
            .iter()
            .zip(ref_u.iter())
            .all(|(x, y)| (x - y).norm() < 1e-13));
        assert!(out
            .down()
            .iter()
            .zip(ref_d.iter())
            .all(|(x, y)| (x - y).norm() < 1e-13));
    }

    #[test]
    fn mixed_layout_multiply_is_rejected() {
        let a = SpinBlockMatrix::new(SpinLayout::Collinear, 2);
        let b = SpinBlockMatrix::new(SpinLayout::NonCollinear, 2);
        let mut out = SpinBlockMatrix::new(SpinLayout::Collinear, 2);
        assert!(matches!(
            SpinBlockMatrix::multiply(&mut out, &a, &b),
            Err(ExchangeError::LayoutMismatch { .. })
        ));
    }

    #[test]
    fn atom_view_down_block_is_offset_by_norb() {
        let n = 2;
        let m = Array2::from_shape_fn((2 * n, 2 * n), |(i, j)| c((10 * i + j) as f64, 0.0));
        let sb = SpinBlockMatrix::from_dense(m.clone()).unwrap();
        let (a, b) = atoms_2x1();
        let dd = sb.atom_view(&a, &b, SpinSel::DD).unwrap();
        assert_eq!(dd[[0, 0]], m[[n, n + 1]]);
        let du = sb.atom_view(&a, &b, SpinSel::DU).unwrap();
        assert_eq!(du[[0, 0]], m[[n, 1]]);
        let all = sb.atom_view(&a, &b, SpinSel::All).unwrap();
        assert_eq!(all.shape(), &[2, 2]);
        assert_eq!(all[[0, 0]], m[[0, 1]]);
        assert_eq!(all[[1, 1]], m[[n, n + 1]]);
    }

    #[test]
    fn elementwise_ops_preserve_layout() {
        let a = SpinBlockMatrix::from_updown(
            Array2::from_elem((2, 2), c(2.0, 0.0)),
            Array2::from_elem((2, 2), c(4.0, 0.0)),
        )
        .unwrap();
        let b = SpinBlockMatrix::from_updown(
            Array2::from_elem((2, 2), c(1.0, 0.0)),
            Array2::from_elem((2, 2), c(2.0, 0.0)),
        )
        .unwrap();
        let sum = &a + &b;
        assert_eq!(sum.layout(), SpinLayout::Collinear);
        assert_eq!(sum.up()[[0, 0]], c(3.0, 0.0));
        let quot = &a / &b;
        assert_eq!(quot.down()[[1, 1]], c(2.0, 0.0));
    }
}
