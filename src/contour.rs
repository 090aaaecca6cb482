//! Complex-plane quadrature for the Green's-function energy integral.
//!
//! The contour is a semicircle in the upper half-plane whose diameter
//! spans `[omega_h, emax]` on the real axis; the phase nodes come from a
//! Gauss-Legendre rule pushed through a logarithmic map, which packs
//! abscissae towards the real axis at the `emax` end where G varies
//! fastest. Integration over the resulting non-uniform abscissae uses a
//! composite three-point Simpson rule.

use ndarray::Array1;
use num_complex::Complex;

/// Gauss-Legendre nodes of order `n` on [-1, 1], ascending.
///
/// Newton iteration on P_n; the standard three-term recurrence supplies
/// P_n and P_{n-1} for the derivative.
pub fn gauss_legendre_nodes(n: usize) -> Array1<f64> {
    let mut x = Array1::<f64>::zeros(n);
    let m = (n + 1) / 2;
    let eps = 1e-14;
    for i in 0..m {
        let nn = n as f64;
        let mut z = (std::f64::consts::PI * (i as f64 + 0.75) / (nn + 0.5)).cos();
        loop {
            let (p1, p2) = legendre_pn(n, z);
            let pp = nn * (z * p1 - p2) / (z * z - 1.0);
            let z1 = z;
            z = z1 - p1 / pp;
            if (z - z1).abs() < eps {
                x[i] = -z;
                x[n - 1 - i] = z;
                break;
            }
        }
    }
    x
}

/// (P_n(z), P_{n-1}(z)) by the three-term recurrence.
fn legendre_pn(n: usize, z: f64) -> (f64, f64) {
    let mut p1 = 1.0;
    let mut p2 = 0.0;
    for j in 1..=n {
        let p3 = p2;
        p2 = p1;
        p1 = ((2.0 * j as f64 - 1.0) * z * p2 - (j as f64 - 1.0) * p3) / (j as f64);
    }
    (p1, p2)
}

/// Semicircular contour of `n` abscissae over `[omega_h, emax]`, ordered
/// from the `omega_h` end towards `emax`.
///
/// Phases follow `phi = (exp(y) - 1)/p` with `y = ln(1 + p*pi)*(1 - x)/2`
/// over the Gauss-Legendre nodes x; larger `p` packs harder towards the
/// real axis. Every abscissa has strictly positive imaginary part since
/// the Gauss-Legendre nodes exclude the endpoints.
#[allow(non_snake_case)]
pub fn gen_contour_semicircle(omega_h: f64, n: usize, emax: f64, p: f64) -> Array1<Complex<f64>> {
    let R0 = 0.5 * (emax + omega_h);
    let R = 0.5 * (emax - omega_h);
    let span = (1.0 + p * std::f64::consts::PI).ln();
    gauss_legendre_nodes(n).mapv(|x| {
        let y = 0.5 * span * (1.0 - x);
        let phi = (y.exp() - 1.0) / p;
        R0 + R * Complex::new(0.0, phi).exp()
    })
}

/// Composite Simpson integral of samples `f` over possibly-unequal
/// (complex) abscissae `x`.
///
/// Pairs of intervals take the exact three-point quadratic rule; an
/// even sample count closes with the asymmetric three-point stencil on
/// the last interval, whose third term enters with a minus sign. Two
/// samples degrade to the trapezoid.
pub fn integrate_simpson(f: &[Complex<f64>], x: &[Complex<f64>]) -> Complex<f64> {
    assert_eq!(f.len(), x.len(), "sample and abscissa counts differ");
    let n = x.len();
    let mut total = Complex::new(0.0, 0.0);
    if n < 2 {
        return total;
    }
    if n == 2 {
        return 0.5 * (x[1] - x[0]) * (f[0] + f[1]);
    }
    let mut i = 0;
    while i + 2 < n {
        let h1 = x[i + 1] - x[i];
        let h2 = x[i + 2] - x[i + 1];
        let h = h1 + h2;
        total += h / 6.0
            * ((2.0 - h2 / h1) * f[i] + h * h / (h1 * h2) * f[i + 1] + (2.0 - h1 / h2) * f[i + 2]);
        i += 2;
    }
    if i + 2 == n {
        // even sample count: one interval left over
        let h1 = x[n - 2] - x[n - 3];
        let h2 = x[n - 1] - x[n - 2];
        total += f[n - 1] * (2.0 * h2 * h2 + 3.0 * h1 * h2) / (6.0 * (h1 + h2))
            + f[n - 2] * (h2 * h2 + 3.0 * h1 * h2) / (6.0 * h1)
            - f[n - 3] * h2 * h2 * h2 / (6.0 * h1 * (h1 + h2));
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn real_axis(xs: &[f64]) -> Vec<Complex<f64>> {
        xs.iter().map(|&x| Complex::new(x, 0.0)).collect()
    }

    #[test]
    fn legendre_nodes_are_symmetric_roots() {
        let x = gauss_legendre_nodes(8);
        for i in 0..8 {
            assert_abs_diff_eq!(x[i], -x[7 - i], epsilon = 1e-13);
            let (p, _) = legendre_pn(8, x[i]);
            assert_abs_diff_eq!(p, 0.0, epsilon = 1e-12);
        }
        assert!(x.windows(2).into_iter().all(|w| w[0] < w[1]));
    }

    #[test]
    fn contour_stays_in_upper_half_plane_on_the_circle() {
        let (omega_h, emax, p) = (-30.0, 0.001, 13.0);
        let omegas = gen_contour_semicircle(omega_h, 60, emax, p);
        let r0 = 0.5 * (emax + omega_h);
        let r = 0.5 * (emax - omega_h);
        for w in omegas.iter() {
            assert!(w.im > 0.0);
            assert_abs_diff_eq!((*w - r0).norm(), r, epsilon = 1e-9 * r);
        }
        // ordered from the omega_h end towards emax
        assert!(omegas[0].re < omegas[59].re);
        // logarithmic packing: the last gap in Re is much smaller than the first
        let first = (omegas[1] - omegas[0]).norm();
        let last = (omegas[59] - omegas[58]).norm();
        assert!(last < 0.05 * first);
    }

    #[test]
    fn simpson_is_exact_on_quadratics() {
        // deliberately uneven abscissae, odd and even counts
        for xs in [
            vec![0.0, 0.3, 0.5, 1.1, 2.0],
            vec![0.0, 0.4, 0.9, 1.3, 1.8, 2.0],
        ] {
            let x = real_axis(&xs);
            let ones: Vec<_> = xs.iter().map(|_| Complex::new(1.0, 0.0)).collect();
            let lin: Vec<_> = xs.iter().map(|&t| Complex::new(t, 0.0)).collect();
            let quad: Vec<_> = xs.iter().map(|&t| Complex::new(t * t, 0.0)).collect();
            assert_abs_diff_eq!(integrate_simpson(&ones, &x).re, 2.0, epsilon = 1e-12);
            assert_abs_diff_eq!(integrate_simpson(&lin, &x).re, 2.0, epsilon = 1e-12);
            assert_abs_diff_eq!(
                integrate_simpson(&quad, &x).re,
                8.0 / 3.0,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn simpson_converges_on_a_cubic() {
        let n = 101;
        let xs: Vec<f64> = (0..n).map(|i| i as f64 / (n - 1) as f64).collect();
        let x = real_axis(&xs);
        let f: Vec<_> = xs.iter().map(|&t| Complex::new(t * t * t, 0.0)).collect();
        assert_abs_diff_eq!(integrate_simpson(&f, &x).re, 0.25, epsilon = 1e-8);
    }

    #[test]
    fn two_samples_fall_back_to_trapezoid() {
        let x = real_axis(&[0.0, 2.0]);
        let f = vec![Complex::new(1.0, 0.0), Complex::new(3.0, 0.0)];
        assert_abs_diff_eq!(integrate_simpson(&f, &x).re, 4.0, epsilon = 1e-14);
    }
}
