//! The atom catalog consumed by the exchange solver.
//!
//! Each entry names an atom, fixes its Cartesian position, and maps it to a
//! contiguous range of up-spin orbital indices in the Wannier basis. The
//! down-spin indices are implicit: orbital `i` of the up sub-basis pairs
//! with `i + norb` in the full spinor basis.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// One atom of the model, with its up-spin orbital window.
///
/// Atoms without an orbital window are legal catalog entries; the solver
/// skips any exchange pair that involves one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    name: String,
    /// Cartesian position, in the same length unit as the lattice matrix.
    position: Array1<f64>,
    /// Indices of this atom's orbitals inside the up-spin sub-basis 0..N.
    uprange: Option<Range<usize>>,
}

impl Atom {
    pub fn new(name: &str, position: Array1<f64>, uprange: Option<Range<usize>>) -> Atom {
        Atom {
            name: name.to_string(),
            position,
            uprange,
        }
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline(always)]
    pub fn position(&self) -> &Array1<f64> {
        &self.position
    }

    #[inline(always)]
    pub fn uprange(&self) -> Option<Range<usize>> {
        self.uprange.clone()
    }

    /// Number of orbitals on this atom; zero without an orbital window.
    #[inline(always)]
    pub fn norb(&self) -> usize {
        self.uprange.as_ref().map_or(0, |r| r.len())
    }

    /// Copy of this atom displaced by a Cartesian translation.
    pub fn translated(&self, shift: &Array1<f64>) -> Atom {
        Atom {
            name: self.name.clone(),
            position: &self.position + shift,
            uprange: self.uprange.clone(),
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.name)?;
        for (i, x) in self.position.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:.6}", x)?;
        }
        write!(f, "]")
    }
}
