//! Forward recurrences over chain transition sequences.
//!
//! Both scans share the same contract: `alpha` is a caller-allocated
//! `(T+1) × N × C` buffer whose first row is seeded with the initial
//! boundary vector; the scan fills rows `1..=T` with
//! `alpha[t+1] = sum_source( M[t] ⊗ alpha[t] )`. The time dimension is
//! strictly sequential; batch and state dimensions are independent.

pub mod dense;
pub mod sparse;

use std::num::NonZeroUsize;

/// Tuning knobs for a scan invocation.
///
/// The rescale checkpoint interval is a pure performance and numeric-range
/// trade-off: rescaling divides the running vector by its semiring sum at
/// end-aligned checkpoints and reinstates the accumulated divisor in the
/// final result, which cancels exactly up to floating-point rounding.
/// Results are only guaranteed stable when the interval is tuned so that
/// accumulated weights stay within representable range between
/// checkpoints; shrink it for weights of large magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    rescale_interval: Option<NonZeroUsize>,
}

impl ScanOptions {
    /// Default checkpoint stride.
    ///
    /// Chosen empirically for log-probability-scale weights; tune against
    /// the dynamic range of your inputs rather than treating it as fixed.
    pub const DEFAULT_RESCALE_INTERVAL: usize = 32;

    /// Rescale every `interval` steps (end-aligned).
    ///
    /// An interval larger than the sequence length degenerates to a
    /// single rescale at the final step.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn rescale_every(interval: usize) -> Self {
        Self {
            rescale_interval: Some(
                NonZeroUsize::new(interval).expect("rescale interval must be nonzero"),
            ),
        }
    }

    /// Disable rescaling; the recurrence runs purely in the semiring
    /// domain, which is stable for log-domain weights.
    pub fn no_rescale() -> Self {
        Self {
            rescale_interval: None,
        }
    }

    /// Configured checkpoint stride, if any.
    #[inline]
    pub fn rescale_interval(&self) -> Option<usize> {
        self.rescale_interval.map(NonZeroUsize::get)
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::rescale_every(Self::DEFAULT_RESCALE_INTERVAL)
    }
}

/// End-aligned checkpoint test: fires every `interval` steps counting
/// back from the final step, so the last step is always a checkpoint.
#[inline]
pub(crate) fn at_checkpoint(t: usize, steps: usize, interval: usize) -> bool {
    t % interval == (steps - 1) % interval
}
