//! Sequential CPU reference backend.

use super::{Backend, KernelKey};
use crate::algebra::Semiring;
use crate::chain::{DenseSeq, SparseSeq};
use crate::error::Result;
use crate::scan::{dense, sparse, ScanOptions};

/// The reference backend: sequential scans over host memory.
///
/// Every (precision, semiring, structure) combination is registered;
/// accelerated backends are validated against this one.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cpu;

impl Backend for Cpu {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn supports(&self, _key: KernelKey) -> bool {
        true
    }

    fn dense_forward<S: Semiring>(
        &self,
        seq: &DenseSeq<S::Scalar>,
        alpha: &mut [S::Scalar],
        carry: &mut [S::Scalar],
        options: &ScanOptions,
    ) -> Result<()> {
        dense::forward::<S>(seq, alpha, carry, options)
    }

    fn sparse_forward<S: Semiring>(
        &self,
        seq: &SparseSeq<S::Scalar>,
        alpha: &mut [S::Scalar],
    ) -> Result<()> {
        sparse::forward::<S>(seq, alpha)
    }
}
