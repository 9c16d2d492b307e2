//! Forward-backward orchestration.
//!
//! [`Engine::evaluate`] runs a forward scan and reduces the final state
//! against the final boundary vector into the per-batch partition.
//! [`Engine::forward`] additionally hands back an [`Evaluation`] that
//! retains the full alpha buffer; [`Evaluation::gradient`] runs the
//! backward scan and combines both into the per-transition gradient.
//!
//! The gradient is only reachable through an `Evaluation`, which borrows
//! the transition data for its whole lifetime. That makes the two
//! ordering rules structural: a gradient always uses the alpha of its own
//! forward pass, and the transition weights cannot be mutated between the
//! two passes.

use std::marker::PhantomData;

use crate::algebra::Semiring;
use crate::backend::{Backend, Cpu, KernelKey};
use crate::chain::Transitions;
use crate::error::{Error, Result};
use crate::scan::ScanOptions;

/// Forward-backward engine over a backend.
///
/// Construction is explicit: the backend handle and scan options are
/// plain fields of the engine, not process-wide state.
///
/// # Example
///
/// ```rust
/// use seqring::{DenseSeq, Engine, Log};
///
/// // one step, two states, every edge carrying weight log(0.5)
/// let w = 0.5f64.ln();
/// let seq = DenseSeq::new(1, 1, 2, vec![w; 4]).unwrap();
/// let v0 = vec![0.0, f64::NEG_INFINITY]; // start in state 0
/// let vt = vec![0.0, 0.0];               // accept in any state
///
/// let engine = Engine::default();
/// let logz = engine.evaluate::<Log<f64>>(&seq.into(), &v0, &vt).unwrap();
/// assert!(logz[0].abs() < 1e-9); // log(0.5 + 0.5) = 0
/// ```
pub struct Engine<B: Backend = Cpu> {
    backend: B,
    options: ScanOptions,
}

impl Default for Engine<Cpu> {
    fn default() -> Self {
        Self::new(Cpu)
    }
}

impl<B: Backend> Engine<B> {
    /// Engine with default scan options.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            options: ScanOptions::default(),
        }
    }

    /// Engine with explicit scan options.
    pub fn with_options(backend: B, options: ScanOptions) -> Self {
        Self { backend, options }
    }

    /// The backend handle.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The scan options.
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Log-partition of every batch element.
    pub fn evaluate<S: Semiring>(
        &self,
        transitions: &Transitions<S::Scalar>,
        v0: &[S::Scalar],
        vt: &[S::Scalar],
    ) -> Result<Vec<S::Scalar>> {
        Ok(self
            .forward::<S>(transitions, v0, vt)?
            .log_partition()
            .to_vec())
    }

    /// Forward scan, returning an [`Evaluation`] for gradient requests.
    pub fn forward<'a, S: Semiring>(
        &'a self,
        transitions: &'a Transitions<S::Scalar>,
        v0: &[S::Scalar],
        vt: &'a [S::Scalar],
    ) -> Result<Evaluation<'a, S, B>> {
        let (steps, batch, states) = transitions.dims();
        check_boundary("v0", v0.len(), batch * states)?;
        check_boundary("vT", vt.len(), batch * states)?;

        let key = KernelKey::of::<S>(transitions.structure());
        if !self.backend.supports(key) {
            return Err(Error::Unsupported {
                backend: self.backend.name(),
                key,
            });
        }

        let mut alpha = vec![S::zero().to_scalar(); (steps + 1) * batch * states];
        alpha[..batch * states].copy_from_slice(v0);
        let mut carry = vec![S::one().to_scalar(); batch];

        match transitions {
            Transitions::Dense(seq) => {
                self.backend
                    .dense_forward::<S>(seq, &mut alpha, &mut carry, &self.options)?
            }
            Transitions::Sparse(seq) => self.backend.sparse_forward::<S>(seq, &mut alpha)?,
        }

        let mut terms = vec![S::zero(); states];
        let logz = (0..batch)
            .map(|n| {
                let off = steps * batch * states + n * states;
                for ((term, &a), &v) in terms
                    .iter_mut()
                    .zip(&alpha[off..off + states])
                    .zip(&vt[n * states..n * states + states])
                {
                    *term = S::from_scalar(a).mul(S::from_scalar(v));
                }
                S::from_scalar(carry[n]).mul(S::sum(&terms)).to_scalar()
            })
            .collect();

        Ok(Evaluation {
            engine: self,
            transitions,
            final_weights: vt,
            alpha,
            logz,
            _semiring: PhantomData,
        })
    }
}

fn check_boundary(what: &'static str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(Error::Shape {
            what,
            expected,
            got,
        });
    }
    Ok(())
}

/// Result of a forward scan, holding everything the backward pass needs.
///
/// Borrows the transition sequence and final boundary for its lifetime;
/// the retained alpha buffer spans the full sequence because the combine
/// step reads every time step pointwise.
pub struct Evaluation<'a, S: Semiring, B: Backend> {
    engine: &'a Engine<B>,
    transitions: &'a Transitions<S::Scalar>,
    final_weights: &'a [S::Scalar],
    alpha: Vec<S::Scalar>,
    logz: Vec<S::Scalar>,
    _semiring: PhantomData<S>,
}

impl<'a, S: Semiring, B: Backend> Evaluation<'a, S, B> {
    /// Per-batch log-partition, length `N`.
    pub fn log_partition(&self) -> &[S::Scalar] {
        &self.logz
    }

    /// Retained forward scores, `(T+1) × N × C`.
    pub fn alpha(&self) -> &[S::Scalar] {
        &self.alpha
    }

    /// Per-transition gradient, shaped like the transition data.
    ///
    /// `upstream` is the incoming gradient of each batch element's
    /// partition (the chain-rule scalar from the surrounding loss);
    /// pass all ones for the raw derivative.
    pub fn gradient(&self, upstream: &[S::Scalar]) -> Result<Vec<S::Scalar>> {
        let (_, batch, _) = self.transitions.dims();
        check_boundary("upstream gradient", upstream.len(), batch)?;
        match self.transitions {
            Transitions::Dense(seq) => self.engine.backend.dense_gradient::<S>(
                seq,
                &self.alpha,
                self.final_weights,
                upstream,
                &self.engine.options,
            ),
            Transitions::Sparse(seq) => self.engine.backend.sparse_gradient::<S>(
                seq,
                &self.alpha,
                self.final_weights,
                upstream,
            ),
        }
    }
}
