#![allow(warnings)]
//! Magnetic exchange couplings from Wannier tight-binding models.
//!
//! Given a tight-binding operator H(R) in a Wannier basis, this crate
//! interpolates H(k) on a dense k-grid, contour-integrates the
//! one-particle Green's function in the complex energy plane, and
//! evaluates inter-site exchange couplings J_ij between selected atoms
//! with the Lichtenstein (LKAG) formula:
//!
//! $$ J_{ij} = -\frac{10^3}{4\pi}\,\mathrm{Im}\oint d\omega\,
//!    \mathrm{tr}\,[\Delta_i G^{\uparrow}_{ij}(\omega)
//!    \Delta_j G^{\downarrow}_{ji}(\omega)] $$
//!
//! The crate deals only in operators already expressed over lattice
//! vectors; file formats, Wannierization, and plotting live upstream.
//!
//! Entry point: [`exchange::calc_exchanges`].

pub mod atom_struct;
pub mod contour;
pub mod eigen;
pub mod error;
pub mod exchange;
pub mod greens;
pub mod interpolate;
pub mod kpoints;
pub mod phy_const;
pub mod spin_matrix;

pub use atom_struct::Atom;
pub use eigen::EigenWorkspace;
pub use error::{ExchangeError, Result};
pub use exchange::{calc_exchanges, ExchangeOpts, ExchangeRecord};
pub use kpoints::gen_kmesh_mp;
pub use spin_matrix::{MagneticVector, SpinBlockMatrix, SpinLayout, SpinSel};

use ndarray::prelude::*;
use num_complex::Complex;

/// A tight-binding operator: the ordered list of lattice vectors R and
/// the spin-block matrices H(R) that define the Fourier series
/// H(k) = (1/n_R) sum_R exp(i 2 pi k.R) H(R).
///
/// Every block shares one dimension and one layout; the list length is
/// the denominator of the inverse Fourier average, because the upstream
/// R-vector list is a symmetrization-corrected Wigner-Seitz set whose
/// weight is exactly its cardinality.
#[derive(Debug, Clone)]
pub struct TbOperator {
    norb: usize,
    layout: SpinLayout,
    rvecs: Array2<isize>,
    ham: Vec<SpinBlockMatrix>,
}

impl TbOperator {
    /// Empty operator over `norb` up-spin orbitals.
    pub fn new(layout: SpinLayout, norb: usize) -> TbOperator {
        TbOperator {
            norb,
            layout,
            rvecs: Array2::zeros((0, 3)),
            ham: Vec::new(),
        }
    }

    /// Operator from parallel lists of R-vectors (rows of `rvecs`) and
    /// spin-block matrices. All blocks must agree in layout and
    /// dimension.
    pub fn from_blocks(rvecs: Array2<isize>, ham: Vec<SpinBlockMatrix>) -> Result<TbOperator> {
        if rvecs.ncols() != 3 {
            return Err(ExchangeError::ShapeMismatch {
                context: "TbOperator R-vectors",
                expected: 3,
                found: rvecs.ncols(),
            });
        }
        if rvecs.nrows() != ham.len() {
            return Err(ExchangeError::ShapeMismatch {
                context: "TbOperator block count",
                expected: rvecs.nrows(),
                found: ham.len(),
            });
        }
        let first = ham.first().ok_or(ExchangeError::ShapeMismatch {
            context: "TbOperator block count",
            expected: 1,
            found: 0,
        })?;
        let (layout, norb) = (first.layout(), first.norb());
        for h in ham.iter() {
            if h.layout() != layout {
                return Err(ExchangeError::LayoutMismatch {
                    op: "TbOperator::from_blocks",
                });
            }
            if h.norb() != norb {
                return Err(ExchangeError::ShapeMismatch {
                    context: "TbOperator block dimension",
                    expected: norb,
                    found: h.norb(),
                });
            }
        }
        Ok(TbOperator {
            norb,
            layout,
            rvecs,
            ham,
        })
    }

    /// Non-collinear operator from matrices in the upstream interleaved
    /// spin convention; de-interleaves once at ingest.
    pub fn from_interleaved(
        rvecs: Array2<isize>,
        mats: &[Array2<Complex<f64>>],
    ) -> Result<TbOperator> {
        let ham = mats
            .iter()
            .map(SpinBlockMatrix::from_interleaved)
            .collect::<Result<Vec<_>>>()?;
        TbOperator::from_blocks(rvecs, ham)
    }

    /// Append one (R, H(R)) pair.
    pub fn add_block(&mut self, rvec: &[isize; 3], h: SpinBlockMatrix) -> Result<()> {
        if h.layout() != self.layout {
            return Err(ExchangeError::LayoutMismatch {
                op: "TbOperator::add_block",
            });
        }
        if h.norb() != self.norb {
            return Err(ExchangeError::ShapeMismatch {
                context: "TbOperator::add_block",
                expected: self.norb,
                found: h.norb(),
            });
        }
        self.rvecs
            .push_row(ArrayView::from(rvec.as_slice()))
            .expect("R-vector rows are always length 3");
        self.ham.push(h);
        Ok(())
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

    /// Number of R-vectors, i.e. the Fourier-average denominator.
    #[inline(always)]
    pub fn nR(&self) -> usize {
        self.ham.len()
    }

    #[inline(always)]
    pub fn rvecs(&self) -> &Array2<isize> {
        &self.rvecs
    }

    #[inline(always)]
    pub fn ham(&self) -> &[SpinBlockMatrix] {
        &self.ham
    }
}
