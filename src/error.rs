//! Error types for the exchange engine.
//!
//! A single centralized enum keeps every fallible operation on a
//! recoverable `Result` path; only the operator-trait impls on
//! [`crate::SpinBlockMatrix`] panic, since the `std::ops` traits carry no
//! error channel.

use thiserror::Error;

/// The primary error type for all fallible operations in this library.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Dimension or parity violation at ingest or inside a kernel.
    #[error("shape mismatch in '{context}': expected {expected}, got {found}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    /// An operation mixed Collinear and NonCollinear operands.
    #[error("layout mismatch: '{op}' requires operands of one spin layout")]
    LayoutMismatch { op: &'static str },

    /// The Hermitian eigensolver returned a non-zero info code.
    #[error("LAPACK routine '{routine}' failed with info code {info}")]
    Lapack { routine: &'static str, info: i32 },
}

/// A specialized `Result` type for this library's operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;
