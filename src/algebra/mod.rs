//! Algebraic structures for chain scoring.
//!
//! This module defines the [`Semiring`] trait and the two standing
//! implementations:
//! - [`Log<T>`]: log-sum-exp semiring, for the true log-partition and
//!   posterior marginals
//! - [`Max<T>`]: max-plus semiring, for best-path (Viterbi) scores

mod log;
mod max;
mod semiring;

pub use log::Log;
pub use max::Max;
pub use semiring::{Semiring, SemiringKind};

/// Numeric precision of a scalar type, used as a kernel-registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    /// 32-bit floating point.
    Single,
    /// 64-bit floating point.
    Double,
}

/// Marker trait for scalar types that can carry semiring values.
///
/// Scans are generic over the scalar width; only floating-point types make
/// sense here because both standing semirings store log-domain weights.
pub trait Scalar:
    Copy
    + Clone
    + Send
    + Sync
    + Default
    + PartialOrd
    + std::fmt::Debug
    + 'static
    + bytemuck::Pod
    + num_traits::Float
{
    /// Registry tag for this scalar width.
    const PRECISION: Precision;
}

impl Scalar for f32 {
    const PRECISION: Precision = Precision::Single;
}

impl Scalar for f64 {
    const PRECISION: Precision = Precision::Double;
}
