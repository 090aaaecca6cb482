//! The exchange solver: orchestrates interpolation, contour quadrature,
//! and Green's-function assembly into Lichtenstein exchange couplings
//!
//! $$ J_{ij} = -\frac{10^3}{4\pi}\,\mathrm{Im}\oint d\omega\,
//!    s_i s_j\,\Delta_i G^{\uparrow}_{ij}(\omega)
//!    \Delta_j G^{\downarrow}_{ji}(\omega) $$
//!
//! element-wise over the orbital windows of the two atoms. The sign
//! factors s = -sign(Re tr Delta) make J > 0 ferromagnetic regardless of
//! which sublattice is locally up.

use crate::atom_struct::Atom;
use crate::contour::{gen_contour_semicircle, integrate_simpson};
use crate::error::{ExchangeError, Result};
use crate::greens::gen_green_all;
use crate::interpolate::gen_k_eigens;
use crate::kpoints::gen_kmesh_mp;
use crate::phy_const::EXCHANGE_MEV;
use crate::spin_matrix::{SpinBlockMatrix, SpinSel};
use crate::TbOperator;
use log::{debug, warn};
use ndarray::prelude::*;
use num_complex::Complex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Options for [`calc_exchanges`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeOpts {
    /// k-grid subdivisions per reciprocal axis.
    pub nk: [usize; 3],
    /// Lattice displacement R of the second atom of every pair.
    pub rvec: [isize; 3],
    /// Lower end of the contour diameter on the real axis, relative to mu.
    pub omega_h: f64,
    /// Number of contour abscissae.
    pub n_omega: usize,
    /// Upper end of the contour diameter; slightly above zero keeps the
    /// closing abscissae off the Fermi level.
    pub emax: f64,
    /// Packing parameter of the logarithmic phase map.
    pub p: f64,
    /// Shift the k-grid so it passes through Gamma.
    pub gamma_centered: bool,
    /// Keep only the orbital-diagonal entries of each J matrix.
    pub site_diagonal: bool,
}

impl Default for ExchangeOpts {
    fn default() -> ExchangeOpts {
        ExchangeOpts {
            nk: [10, 10, 10],
            rvec: [0, 0, 0],
            omega_h: -30.0,
            n_omega: 100,
            emax: 0.001,
            p: 13.0,
            gamma_centered: false,
            site_diagonal: false,
        }
    }
}

/// One computed exchange coupling: the pair of atoms (the second already
/// translated by `cell . R`) and the orbital-resolved J matrix in meV.
#[derive(Debug, Clone)]
pub struct ExchangeRecord {
    pub atom_i: Atom,
    pub atom_j: Atom,
    pub rvec: Array1<isize>,
    pub jmat: Array2<f64>,
}

impl ExchangeRecord {
    /// Total coupling, summed over orbital pairs.
    pub fn j_sum(&self) -> f64 {
        self.jmat.sum()
    }

    /// Cartesian distance between the two (translated) sites.
    pub fn distance(&self) -> f64 {
        (self.atom_i.position() - self.atom_j.position())
            .mapv(|x| x * x)
            .sum()
            .sqrt()
    }
}

impl fmt::Display for ExchangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -- {}  R = [{} {} {}]  d = {:.6}  sum J = {:.6} meV",
            self.atom_i,
            self.atom_j,
            self.rvec[0],
            self.rvec[1],
            self.rvec[2],
            self.distance(),
            self.j_sum()
        )
    }
}

/// The per-energy exchange kernel: t[i,j] = s_i s_j Delta_i[i]
/// G_up[i,j] Delta_j[j] G_down[j,i] over the orbital windows of the two
/// atoms. Only the diagonal of each on-site splitting block enters.
fn j_omega(
    atom_i: &Atom,
    atom_j: &Atom,
    delta: &Array2<Complex<f64>>,
    g: &SpinBlockMatrix,
    site_diagonal: bool,
) -> Result<Array2<Complex<f64>>> {
    let ra = atom_i.uprange().ok_or(ExchangeError::ShapeMismatch {
        context: "j_omega atom without orbital window",
        expected: 1,
        found: 0,
    })?;
    let rb = atom_j.uprange().ok_or(ExchangeError::ShapeMismatch {
        context: "j_omega atom without orbital window",
        expected: 1,
        found: 0,
    })?;
    let di: Vec<Complex<f64>> = ra.clone().map(|i| delta[[i, i]]).collect();
    let dj: Vec<Complex<f64>> = rb.clone().map(|j| delta[[j, j]]).collect();
    let tr_i: Complex<f64> = di.iter().sum();
    let tr_j: Complex<f64> = dj.iter().sum();
    let si = -tr_i.re.signum();
    let sj = -tr_j.re.signum();
    let g_fwd = g.atom_view(atom_i, atom_j, SpinSel::Up)?;
    let g_bwd = g.atom_view(atom_j, atom_i, SpinSel::Down)?;
    let mut t = Array2::zeros((ra.len(), rb.len()));
    for i in 0..ra.len() {
        for j in 0..rb.len() {
            if site_diagonal && i != j {
                continue;
            }
            t[[i, j]] = si * sj * di[i] * g_fwd[[i, j]] * dj[j] * g_bwd[[j, i]];
        }
    }
    Ok(t)
}

/// Compute exchange couplings for every ordered pair of the atoms listed
/// in `order` that carries an orbital window.
///
/// `cell` is the 3x3 lattice matrix (rows are lattice vectors) used to
/// translate the second atom of each pair by the displacement
/// `opts.rvec`; `mu` positions the contour. Pairs involving an atom
/// without an orbital window are silently absent from the output; solver
/// errors abort the whole calculation with no partial result.
#[allow(non_snake_case)]
pub fn calc_exchanges(
    tb: &TbOperator,
    atoms: &[Atom],
    order: &[usize],
    cell: &Array2<f64>,
    mu: f64,
    opts: &ExchangeOpts,
) -> Result<Vec<ExchangeRecord>> {
    let norb = tb.norb();
    if opts.nk.iter().any(|&n| n == 0) {
        return Err(ExchangeError::ShapeMismatch {
            context: "calc_exchanges k-grid subdivisions",
            expected: 1,
            found: 0,
        });
    }
    for &ia in order.iter() {
        if ia >= atoms.len() {
            return Err(ExchangeError::ShapeMismatch {
                context: "calc_exchanges atom index",
                expected: atoms.len(),
                found: ia,
            });
        }
        if let Some(r) = atoms[ia].uprange() {
            if r.end > norb {
                return Err(ExchangeError::ShapeMismatch {
                    context: "calc_exchanges orbital window",
                    expected: norb,
                    found: r.end,
                });
            }
        }
    }

    let pairs: Vec<(usize, usize)> = order
        .iter()
        .flat_map(|&a| order.iter().map(move |&b| (a, b)))
        .filter(|&(a, b)| atoms[a].uprange().is_some() && atoms[b].uprange().is_some())
        .collect();
    if pairs.is_empty() {
        return Ok(Vec::new());
    }

    let rvec = Array1::from(opts.rvec.to_vec());
    let kpts = gen_kmesh_mp(&opts.nk, opts.gamma_centered);
    debug!(
        "interpolating H(k) on {} k-points ({} orbitals, {:?})",
        kpts.nrows(),
        norb,
        tb.layout()
    );
    let kdata = gen_k_eigens(tb, &kpts, &rvec)?;

    let omegas = gen_contour_semicircle(opts.omega_h, opts.n_omega, opts.emax, opts.p);
    debug!(
        "assembling G(omega) on {} contour energies, mu = {}",
        omegas.len(),
        mu
    );
    let greens = gen_green_all(&omegas, &kdata, mu)?;

    let shift: Array1<f64> = rvec.mapv(|r| r as f64).dot(cell);
    let omega_nodes = omegas.to_vec();

    pairs
        .into_par_iter()
        .map(|(ia, ib)| {
            let atom_i = atoms[ia].clone();
            let atom_j = atoms[ib].translated(&shift);
            let (na, nb) = (atom_i.norb(), atom_j.norb());

            // t[i,j](omega) for every contour energy, then element-wise
            // Simpson integration along the contour
            let t_series = greens
                .iter()
                .map(|g| j_omega(&atom_i, &atom_j, &kdata.delta, g, opts.site_diagonal))
                .collect::<Result<Vec<_>>>()?;
            let mut jmat = Array2::zeros((na, nb));
            let mut total = Complex::new(0.0, 0.0);
            let mut samples = vec![Complex::new(0.0, 0.0); omega_nodes.len()];
            for i in 0..na {
                for j in 0..nb {
                    for (w, t) in t_series.iter().enumerate() {
                        samples[w] = t[[i, j]];
                    }
                    let integral = integrate_simpson(&samples, &omega_nodes);
                    total += integral;
                    jmat[[i, j]] = EXCHANGE_MEV * integral.im;
                }
            }
            if total.im.abs() > 1.0e6 * total.re.abs() && total.im.abs() > 0.0 {
                warn!(
                    "exchange integral for pair ({}, {}) is dominated by its imaginary part (re = {:e}, im = {:e})",
                    atom_i.name(),
                    atom_j.name(),
                    total.re,
                    total.im
                );
            }
            Ok(ExchangeRecord {
                atom_i,
                atom_j,
                rvec: rvec.clone(),
                jmat,
            })
        })
        .collect::<Result<Vec<_>>>()
}
