//! Fourier interpolation of the tight-binding operator and the parallel
//! per-k eigendecomposition feeding the Green's-function assembly.

use crate::eigen::EigenWorkspace;
use crate::error::Result;
use crate::spin_matrix::{MagneticVector, SpinBlockMatrix};
use crate::TbOperator;
use ndarray::prelude::*;
use num_complex::Complex;
use rayon::prelude::*;
use std::f64::consts::PI;

/// Everything the contour loop needs, precomputed once per k-grid.
pub struct KEigenData {
    /// H(k), kept for diagnostics and the splitting accumulation.
    pub hk: Vec<SpinBlockMatrix>,
    /// Eigenvalues per k; collinear halves each ascending.
    pub eigvals: Vec<MagneticVector>,
    /// Per-k eigenvector matrices, stored as V-dagger (see `eigen`).
    pub eigvecs: Vec<SpinBlockMatrix>,
    /// On-site exchange splitting (D_up - D_down)/nk over the grid.
    pub delta: Array2<Complex<f64>>,
    /// Translation phases exp(i 2 pi k.R) for the requested displacement.
    pub phases: Array1<Complex<f64>>,
}

impl KEigenData {
    #[inline(always)]
    pub fn nk(&self) -> usize {
        self.hk.len()
    }
}

/// out <- (1/n_R) sum_R exp(i 2 pi k.R) H(R). `out` is cleared first.
#[allow(non_snake_case)]
pub fn gen_hk_into(
    out: &mut SpinBlockMatrix,
    tb: &TbOperator,
    kvec: &ArrayView1<f64>,
) -> Result<()> {
    out.set_zero();
    let inv = 1.0 / (tb.nR() as f64);
    for (rvec, h) in tb.rvecs().outer_iter().zip(tb.ham().iter()) {
        let kr: f64 = kvec
            .iter()
            .zip(rvec.iter())
            .map(|(k, r)| k * (*r as f64))
            .sum();
        let phase = Complex::new(0.0, 2.0 * PI * kr).exp() * inv;
        out.scaled_add(phase, h)?;
    }
    Ok(())
}

/// Interpolate, diagonalize, and accumulate over the whole k-grid.
///
/// The k-loop is data-parallel; each worker carries its own
/// [`EigenWorkspace`]. H(k) is built into the eigenvector slot, copied
/// aside, then diagonalized in place. The exchange-splitting accumulator
/// is reduced sequentially after the parallel collect so the result does
/// not depend on the thread count.
#[allow(non_snake_case)]
pub fn gen_k_eigens(
    tb: &TbOperator,
    kpoints: &Array2<f64>,
    rvec: &Array1<isize>,
) -> Result<KEigenData> {
    let nk = kpoints.nrows();
    let (layout, norb) = (tb.layout(), tb.norb());

    let per_k: Vec<(SpinBlockMatrix, MagneticVector, SpinBlockMatrix, Complex<f64>)> = kpoints
        .axis_iter(Axis(0))
        .into_par_iter()
        .map_init(
            || EigenWorkspace::new(layout, norb),
            |ws, kvec| {
                let mut vecs = SpinBlockMatrix::new(layout, norb);
                gen_hk_into(&mut vecs, tb, &kvec)?;
                let hk = vecs.clone();
                let mut vals = Array1::zeros(2 * norb);
                ws.eigen_into(&mut vals, &mut vecs)?;
                let kr: f64 = kvec
                    .iter()
                    .zip(rvec.iter())
                    .map(|(k, r)| k * (*r as f64))
                    .sum();
                let phase = Complex::new(0.0, 2.0 * PI * kr).exp();
                Ok((hk, vals, vecs, phase))
            },
        )
        .collect::<Result<Vec<_>>>()?;

    let mut acc = SpinBlockMatrix::new(layout, norb);
    for (hk, _, _, _) in per_k.iter() {
        acc.scaled_add(Complex::new(1.0, 0.0), hk)?;
    }
    let delta = (&acc.up() - &acc.down()).mapv(|z| z / nk as f64);

    let mut hk = Vec::with_capacity(nk);
    let mut eigvals = Vec::with_capacity(nk);
    let mut eigvecs = Vec::with_capacity(nk);
    let mut phases = Array1::zeros(nk);
    for (i, (h, vals, vecs, phase)) in per_k.into_iter().enumerate() {
        hk.push(h);
        eigvals.push(vals);
        eigvecs.push(vecs);
        phases[i] = phase;
    }

    Ok(KEigenData {
        hk,
        eigvals,
        eigvecs,
        delta,
        phases,
    })
}
