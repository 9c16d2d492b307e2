//! # seqring
//!
//! Semiring forward-backward scans for chain-structured sequence
//! distributions: the log-partition of a weighted chain automaton and its
//! per-transition gradient, computed by hand-derived scans rather than by
//! differentiating through the recurrence.
//!
//! ## Features
//!
//! - **Semiring-generic**: [`Log`] (log-sum-exp) for true log-partition
//!   and marginals, [`Max`] (max-plus) for Viterbi scores and best-path
//!   indicators, behind one [`Semiring`] contract
//! - **Dense and banded scans**: O(T·C²) unrestricted transitions, or
//!   O(T·C·NZ) fixed fan-in with a shared index table
//! - **Periodic rescaling**: checkpointed renormalization keeps the dense
//!   probability-domain recurrence in range, with the discarded scale
//!   reinstated exactly
//! - **Analytic backward pass**: a second scan over the
//!   reversed-transposed chain plus the reduction derivative `dsum`
//!   reproduces what autodiff would compute, without retaining a graph
//! - **CPU + CUDA**: sequential reference backend, NVRTC-compiled kernel
//!   family behind the `cuda` feature with the same numerical contract
//!
//! ## Quick Start
//!
//! ```rust
//! use seqring::{DenseSeq, Engine, Log, Max};
//!
//! // one step, two states, every edge carrying weight log(0.5)
//! let w = 0.5f64.ln();
//! let seq = DenseSeq::new(1, 1, 2, vec![w; 4]).unwrap();
//! let v0 = vec![0.0, f64::NEG_INFINITY]; // start in state 0
//! let vt = vec![0.0, 0.0];               // accept in any state
//! let transitions = seq.into();
//!
//! let engine = Engine::default();
//!
//! // total path weight: log(0.5 + 0.5) = 0
//! let logz = engine.evaluate::<Log<f64>>(&transitions, &v0, &vt).unwrap();
//! assert!(logz[0].abs() < 1e-9);
//!
//! // best single path: log 0.5
//! let best = engine.evaluate::<Max<f64>>(&transitions, &v0, &vt).unwrap();
//! assert!((best[0] - w).abs() < 1e-9);
//!
//! // posterior edge marginals via the retained forward pass
//! let eval = engine.forward::<Log<f64>>(&transitions, &v0, &vt).unwrap();
//! let grad = eval.gradient(&[1.0]).unwrap();
//! assert!((grad[0] - 0.5).abs() < 1e-9);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         User API                            │
//! │   Engine::evaluate(transitions, v0, vT) → logZ             │
//! │   Engine::forward(..) → Evaluation::gradient(upstream)     │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Backend dispatch                         │
//! │   KernelKey = (precision, semiring, structure)             │
//! │   Cpu: sequential reference scans                          │
//! │   Cuda: NVRTC kernel family (feature "cuda")               │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Semiring<Scalar> ops                      │
//! │   Log<T>: (logsumexp, +), dsum = softmax                   │
//! │   Max<T>: (max, +),       dsum = one-hot argmax            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod algebra;
pub mod backend;
pub mod chain;
pub mod engine;
pub mod error;
pub mod scan;

// Re-exports
pub use algebra::{Log, Max, Precision, Scalar, Semiring, SemiringKind};
pub use backend::{Backend, Cpu, KernelKey, Structure};
pub use chain::{DenseSeq, IndexTable, SparseSeq, Transitions};
pub use engine::{Engine, Evaluation};
pub use error::{Error, Result};
pub use scan::ScanOptions;

#[cfg(feature = "cuda")]
pub use backend::Cuda;
