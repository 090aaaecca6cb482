//! Uniform shifted k-grid generation in fractional coordinates.

use ndarray::{Array1, Array2};

/// Fold one fractional component into [-1/2, 1/2).
#[inline(always)]
fn fold_half(x: f64) -> f64 {
    x - (x + 0.5).floor()
}

/// Monkhorst-Pack style grid of `nk = n_x * n_y * n_z` fractional
/// k-points, `k = (i + 1/2)/n - 1/2` per axis.
///
/// With `gamma_centered`, even axes get the half-cell correction
/// `((n+1) mod 2)/(2n)` so the mesh passes through Gamma; components are
/// folded back into [-1/2, 1/2). Ordering is lexicographic with x
/// fastest.
#[allow(non_snake_case)]
pub fn gen_kmesh_mp(k_mesh: &[usize; 3], gamma_centered: bool) -> Array2<f64> {
    let nk = k_mesh[0] * k_mesh[1] * k_mesh[2];
    let shift: Array1<f64> = k_mesh
        .iter()
        .map(|&n| {
            if gamma_centered {
                0.5 * (((n + 1) % 2) as f64) / (n as f64)
            } else {
                0.0
            }
        })
        .collect();
    let mut kvec = Array2::<f64>::zeros((nk, 3));
    let mut row = 0;
    for l in 0..k_mesh[2] {
        for j in 0..k_mesh[1] {
            for i in 0..k_mesh[0] {
                for (ax, idx) in [i, j, l].into_iter().enumerate() {
                    let n = k_mesh[ax] as f64;
                    kvec[[row, ax]] = fold_half((idx as f64 + 0.5) / n - 0.5 + shift[ax]);
                }
                row += 1;
            }
        }
    }
    kvec
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Axis;

    #[test]
    fn unshifted_grid_has_zero_mean() {
        let kvec = gen_kmesh_mp(&[4, 4, 4], false);
        assert_eq!(kvec.nrows(), 64);
        let mean = kvec.mean_axis(Axis(0)).unwrap();
        for m in mean.iter() {
            assert_abs_diff_eq!(*m, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn all_components_stay_in_half_open_cell() {
        for gamma in [false, true] {
            let kvec = gen_kmesh_mp(&[3, 4, 5], gamma);
            assert!(kvec.iter().all(|&x| (-0.5..0.5).contains(&x)));
        }
    }

    #[test]
    fn gamma_centered_even_grid_contains_gamma() {
        let kvec = gen_kmesh_mp(&[2, 2, 2], true);
        let has_gamma = kvec
            .axis_iter(Axis(0))
            .any(|k| k.iter().all(|&x| x.abs() < 1e-14));
        assert!(has_gamma);
    }

    #[test]
    fn x_varies_fastest() {
        let kvec = gen_kmesh_mp(&[3, 2, 1], false);
        assert_abs_diff_eq!(kvec[[1, 0]] - kvec[[0, 0]], 1.0 / 3.0, epsilon = 1e-14);
        assert_abs_diff_eq!(kvec[[1, 1]], kvec[[0, 1]], epsilon = 1e-14);
    }
}
