//! Physical conversion constants.

use std::f64::consts::PI;

/// Converts the raw LKAG contour integral (Hartree-based intermediate
/// quantities) into meV: J = EXCHANGE_MEV * Im(integral).
pub const EXCHANGE_MEV: f64 = -1.0e3 / (4.0 * PI);
