//! Reusable Hermitian eigensolver scratch, driving LAPACK `zheev` directly.
//!
//! One convention, fixed here for the whole crate: storage is row-major,
//! and LAPACK reads a row-major Hermitian buffer as its column-major
//! transpose, i.e. its conjugate. `zheev` therefore hands the
//! eigenvectors back with row m holding the conjugated eigenvector, so
//! the buffer left in `vecs` is V-dagger. The Green's-function assembly
//! consumes exactly that form, and no conversion pass is needed.

#[cfg(any(feature = "intel-mkl-system", feature = "intel-mkl-static"))]
extern crate intel_mkl_src as _src;

#[cfg(any(feature = "openblas-system", feature = "openblas-static"))]
extern crate openblas_src as _src;

#[cfg(any(feature = "netlib-system", feature = "netlib-static"))]
extern crate netlib_src as _src;

use crate::error::{ExchangeError, Result};
use crate::spin_matrix::{MagneticVector, SpinBlockMatrix, SpinLayout};
use lapack::zheev;
use ndarray_linalg::UPLO;
use num_complex::Complex;

#[inline(always)]
fn uplo_char(uplo: UPLO) -> u8 {
    match uplo {
        UPLO::Upper => b'U',
        UPLO::Lower => b'L',
    }
}

/// Scratch for repeated Hermitian diagonalization of one fixed dimension
/// and layout. Not safe to share across workers; each worker owns one.
pub struct EigenWorkspace {
    layout: SpinLayout,
    norb: usize,
    uplo: UPLO,
    a: Vec<Complex<f64>>,
    w: Vec<f64>,
    work: Vec<Complex<f64>>,
    rwork: Vec<f64>,
}

impl EigenWorkspace {
    /// Allocate scratch for matrices of the given layout over `norb`
    /// up-spin orbitals. The optimal `lwork` is obtained with the usual
    /// workspace query.
    pub fn new(layout: SpinLayout, norb: usize) -> EigenWorkspace {
        // Collinear matrices diagonalize blockwise, so the scratch only
        // ever holds one N x N block; non-collinear needs the full 2N.
        let nb = match layout {
            SpinLayout::Collinear => norb,
            SpinLayout::NonCollinear => 2 * norb,
        };
        let n = nb as i32;
        let mut query = vec![Complex::new(0.0, 0.0); 1];
        let mut a = vec![Complex::new(0.0, 0.0); nb * nb];
        let mut w = vec![0.0; nb];
        let mut rwork = vec![0.0; (3 * nb).saturating_sub(2).max(1)];
        let mut info = 0;
        if nb > 0 {
            unsafe {
                zheev(
                    b'V', b'U', n, &mut a, n, &mut w, &mut query, -1, &mut rwork, &mut info,
                );
            }
        }
        let lwork = if info == 0 && nb > 0 {
            (query[0].re as usize).max(2 * nb)
        } else {
            2 * nb.max(1)
        };
        EigenWorkspace {
            layout,
            norb,
            uplo: UPLO::Upper,
            a,
            w,
            work: vec![Complex::new(0.0, 0.0); lwork],
            rwork,
        }
    }

    #[inline(always)]
    pub fn layout(&self) -> SpinLayout {
        self.layout
    }

    #[inline(always)]
    pub fn norb(&self) -> usize {
        self.norb
    }

    /// Diagonalize the Hermitian matrix held in `vecs` in place.
    ///
    /// Collinear: two independent N x N decompositions; `vals[0..N]` and
    /// `vals[N..2N]` are each sorted ascending. Non-collinear: one 2N
    /// decomposition, `vals` globally ascending. On return `vecs` holds
    /// V-dagger per the module convention.
    pub fn eigen_into(&mut self, vals: &mut MagneticVector, vecs: &mut SpinBlockMatrix) -> Result<()> {
        let n = self.norb;
        if vecs.layout() != self.layout || vecs.norb() != n {
            return Err(ExchangeError::LayoutMismatch { op: "eigen_into" });
        }
        if vals.len() != 2 * n {
            return Err(ExchangeError::ShapeMismatch {
                context: "eigen_into eigenvalue vector",
                expected: 2 * n,
                found: vals.len(),
            });
        }
        match self.layout {
            SpinLayout::Collinear => {
                self.eigen_block(vecs, true)?;
                for (i, w) in self.w.iter().enumerate() {
                    vals[i] = *w;
                }
                self.eigen_block(vecs, false)?;
                for (i, w) in self.w.iter().enumerate() {
                    vals[n + i] = *w;
                }
            }
            SpinLayout::NonCollinear => {
                let nb = 2 * n;
                for (dst, src) in self.a.iter_mut().zip(vecs.storage().iter()) {
                    *dst = *src;
                }
                let mut info = 0;
                let uplo = uplo_char(self.uplo);
                let work_len = self.work.len() as i32;
                unsafe {
                    zheev(
                        b'V',
                        uplo,
                        nb as i32,
                        &mut self.a,
                        nb as i32,
                        &mut self.w,
                        &mut self.work,
                        work_len,
                        &mut self.rwork,
                        &mut info,
                    );
                }
                if info != 0 {
                    return Err(ExchangeError::Lapack {
                        routine: "zheev",
                        info,
                    });
                }
                for (dst, src) in vecs.storage_mut().iter_mut().zip(self.a.iter()) {
                    *dst = *src;
                }
                for (i, w) in self.w.iter().enumerate() {
                    vals[i] = *w;
                }
            }
        }
        Ok(())
    }

    /// One spin block of a collinear matrix, in place.
    fn eigen_block(&mut self, vecs: &mut SpinBlockMatrix, up: bool) -> Result<()> {
        let n = self.norb;
        {
            let block = if up { vecs.up() } else { vecs.down() };
            for (dst, src) in self.a.iter_mut().zip(block.iter()) {
                *dst = *src;
            }
        }
        let mut info = 0;
        let uplo = uplo_char(self.uplo);
        let work_len = self.work.len() as i32;
        unsafe {
            zheev(
                b'V',
                uplo,
                n as i32,
                &mut self.a,
                n as i32,
                &mut self.w,
                &mut self.work,
                work_len,
                &mut self.rwork,
                &mut info,
            );
        }
        if info != 0 {
            return Err(ExchangeError::Lapack {
                routine: "zheev",
                info,
            });
        }
        let mut block = if up { vecs.up_mut() } else { vecs.down_mut() };
        for (dst, src) in block.iter_mut().zip(self.a.iter()) {
            *dst = *src;
        }
        Ok(())
    }
}
