//! Error types for scan construction and execution.

use crate::backend::KernelKey;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised at the call boundary.
///
/// All failures are synchronous and deterministic: retrying with identical
/// inputs reproduces the identical error. No partial results are returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A buffer or dimension does not have the declared size.
    Shape {
        /// What was being validated (e.g. `"v0"`, `"step weights"`).
        what: &'static str,
        /// Expected number of elements.
        expected: usize,
        /// Actual number of elements.
        got: usize,
    },

    /// An index-table entry points outside the state range `[0, C)`.
    Index {
        /// The offending entry.
        entry: u32,
        /// Number of states.
        states: usize,
    },

    /// The index table cannot be transposed because fan-out is not uniform.
    ///
    /// Transposition requires every source state to appear exactly `NZ`
    /// times across the table; the backward scan reuses the forward kernel
    /// on the transposed structure and needs the same fan-in.
    Fanout {
        /// The source state with the wrong multiplicity.
        state: usize,
        /// How many times it appears.
        count: usize,
        /// Required multiplicity.
        nz: usize,
    },

    /// No implementation is registered for this configuration.
    Unsupported {
        /// Backend that rejected the request.
        backend: &'static str,
        /// The requested (precision, semiring, structure) combination.
        key: KernelKey,
    },

    /// A device-side failure on the accelerated path.
    Device(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Shape {
                what,
                expected,
                got,
            } => write!(
                f,
                "shape mismatch for {}: expected {} elements, got {}",
                what, expected, got
            ),
            Error::Index { entry, states } => write!(
                f,
                "index-table entry {} out of range for {} states",
                entry, states
            ),
            Error::Fanout { state, count, nz } => write!(
                f,
                "index table is not transposable: source state {} appears {} times, expected {}",
                state, count, nz
            ),
            Error::Unsupported { backend, key } => write!(
                f,
                "backend {} has no kernel registered for {:?}",
                backend, key
            ),
            Error::Device(msg) => write!(f, "device error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
