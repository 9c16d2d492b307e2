//! Execution backends for the scans.
//!
//! The [`Backend`] trait defines the four kernel entry points: dense and
//! sparse forward, dense and sparse gradient. The gradient entry points
//! have reference default implementations (a second scan over the
//! reversed-transposed sequence plus a host-side combine); a backend only
//! has to supply the two forward scans to satisfy the whole contract, and
//! any override must match the reference to floating-point tolerance.
//!
//! Backends declare which configurations they implement through
//! [`Backend::supports`]; the engine rejects unregistered combinations up
//! front instead of silently falling back.

mod cpu;

#[cfg(feature = "cuda")]
mod cuda;

pub use cpu::Cpu;

#[cfg(feature = "cuda")]
pub use cuda::Cuda;

use crate::algebra::{Precision, Semiring, SemiringKind};
use crate::chain::{DenseSeq, SparseSeq};
use crate::error::Result;
use crate::scan::{dense, sparse, ScanOptions};

/// Transition structure of a scan, the third axis of the kernel registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Structure {
    /// Unrestricted C × C transitions.
    Dense,
    /// Fixed fan-in NZ transitions with an index table.
    Sparse,
}

/// Key identifying one specialized kernel configuration.
///
/// A backend is a small registry from keys to concrete scan
/// implementations; lookups that miss fail with an unsupported
/// configuration error at the call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelKey {
    /// Scalar width.
    pub precision: Precision,
    /// Scoring semiring.
    pub semiring: SemiringKind,
    /// Dense or sparse recurrence.
    pub structure: Structure,
}

impl KernelKey {
    /// Key for a semiring/structure pair.
    pub fn of<S: Semiring>(structure: Structure) -> Self {
        Self {
            precision: <S::Scalar as crate::algebra::Scalar>::PRECISION,
            semiring: S::kind(),
            structure,
        }
    }
}

/// A family of scan kernels plus the registry describing it.
pub trait Backend: 'static {
    /// Backend name for error messages and debugging.
    fn name(&self) -> &'static str;

    /// Whether a kernel is registered for this configuration.
    fn supports(&self, key: KernelKey) -> bool;

    /// Dense forward scan. `alpha` is `(T+1) × N × C` with row 0 seeded;
    /// `carry` is one value per batch element, seeded with `one`, and
    /// accumulates rescale divisors.
    fn dense_forward<S: Semiring>(
        &self,
        seq: &DenseSeq<S::Scalar>,
        alpha: &mut [S::Scalar],
        carry: &mut [S::Scalar],
        options: &ScanOptions,
    ) -> Result<()>;

    /// Sparse forward scan. `alpha` as above; no rescaling.
    fn sparse_forward<S: Semiring>(
        &self,
        seq: &SparseSeq<S::Scalar>,
        alpha: &mut [S::Scalar],
    ) -> Result<()>;

    /// Per-transition gradient of the dense partition.
    ///
    /// `alpha` is the retained buffer of the matching forward scan; the
    /// default runs the backward scan through
    /// [`dense_forward`](Backend::dense_forward) on the
    /// reversed-transposed sequence and combines on the host.
    fn dense_gradient<S: Semiring>(
        &self,
        seq: &DenseSeq<S::Scalar>,
        alpha: &[S::Scalar],
        final_weights: &[S::Scalar],
        upstream: &[S::Scalar],
        options: &ScanOptions,
    ) -> Result<Vec<S::Scalar>> {
        let reversed = seq.reversed_transpose();
        let (steps, batch, c) = (seq.steps(), seq.batch(), seq.states());
        let mut beta = vec![S::zero().to_scalar(); (steps + 1) * batch * c];
        beta[..batch * c].copy_from_slice(final_weights);
        let mut carry = vec![S::one().to_scalar(); batch];
        self.dense_forward::<S>(&reversed, &mut beta, &mut carry, options)?;
        Ok(dense::combine::<S>(seq, alpha, &beta, upstream))
    }

    /// Per-transition gradient of the sparse partition.
    ///
    /// Fails if the index table is not transposable.
    fn sparse_gradient<S: Semiring>(
        &self,
        seq: &SparseSeq<S::Scalar>,
        alpha: &[S::Scalar],
        final_weights: &[S::Scalar],
        upstream: &[S::Scalar],
    ) -> Result<Vec<S::Scalar>> {
        let reversed = seq.reversed_transpose()?;
        let (steps, batch, c) = (seq.steps(), seq.batch(), seq.states());
        let mut beta = vec![S::zero().to_scalar(); (steps + 1) * batch * c];
        beta[..batch * c].copy_from_slice(final_weights);
        self.sparse_forward::<S>(&reversed, &mut beta)?;
        Ok(sparse::combine::<S>(seq, alpha, &beta, upstream))
    }
}
