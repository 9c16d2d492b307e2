//! Dense O(T·C²) forward scan with periodic rescaling.

use std::any::TypeId;

use super::{at_checkpoint, ScanOptions};
use crate::algebra::{Log, Semiring};
use crate::chain::DenseSeq;
use crate::error::{Error, Result};

/// Run the dense forward recurrence.
///
/// `alpha` is `(T+1) × N × C` with row 0 seeded by the caller; `carry` is
/// one semiring value per batch element, seeded with `one`, accumulating
/// the rescale divisors. The final partition is
/// `carry ⊗ sum(alpha[T] ⊗ vT)`.
///
/// For the [`Log`] semiring with rescaling enabled, the inter-checkpoint
/// recurrence runs in probability domain as a plain matrix-vector product
/// (faer), which is faster than log-sum-exp per step; the checkpoints
/// bound its dynamic range. All other configurations use the generic
/// semiring loop.
pub fn forward<S: Semiring>(
    seq: &DenseSeq<S::Scalar>,
    alpha: &mut [S::Scalar],
    carry: &mut [S::Scalar],
    options: &ScanOptions,
) -> Result<()> {
    check_buffers(seq.steps(), seq.batch(), seq.states(), alpha.len(), carry.len())?;

    if let Some(interval) = options.rescale_interval() {
        if TypeId::of::<S>() == TypeId::of::<Log<f32>>() {
            forward_prob_f32(
                seq.steps(),
                seq.batch(),
                seq.states(),
                bytemuck::cast_slice(seq.data()),
                bytemuck::cast_slice_mut(alpha),
                bytemuck::cast_slice_mut(carry),
                interval,
            );
            return Ok(());
        }
        if TypeId::of::<S>() == TypeId::of::<Log<f64>>() {
            forward_prob_f64(
                seq.steps(),
                seq.batch(),
                seq.states(),
                bytemuck::cast_slice(seq.data()),
                bytemuck::cast_slice_mut(alpha),
                bytemuck::cast_slice_mut(carry),
                interval,
            );
            return Ok(());
        }
    }

    forward_generic::<S>(seq, alpha, carry, options);
    Ok(())
}

fn check_buffers(
    steps: usize,
    batch: usize,
    states: usize,
    alpha_len: usize,
    carry_len: usize,
) -> Result<()> {
    let expected = (steps + 1) * batch * states;
    if alpha_len != expected {
        return Err(Error::Shape {
            what: "alpha buffer",
            expected,
            got: alpha_len,
        });
    }
    if carry_len != batch {
        return Err(Error::Shape {
            what: "carry buffer",
            expected: batch,
            got: carry_len,
        });
    }
    Ok(())
}

/// Reference recurrence in the semiring domain.
pub(crate) fn forward_generic<S: Semiring>(
    seq: &DenseSeq<S::Scalar>,
    alpha: &mut [S::Scalar],
    carry: &mut [S::Scalar],
    options: &ScanOptions,
) {
    let (steps, batch, c) = (seq.steps(), seq.batch(), seq.states());
    let mut terms = vec![S::zero(); c];

    for t in 0..steps {
        let (head, tail) = alpha.split_at_mut((t + 1) * batch * c);
        let prev = &head[t * batch * c..];
        let next = &mut tail[..batch * c];

        for n in 0..batch {
            for to in 0..c {
                let row = seq.row(t, n, to);
                for from in 0..c {
                    terms[from] =
                        S::from_scalar(row[from]).mul(S::from_scalar(prev[n * c + from]));
                }
                next[n * c + to] = S::sum(&terms).to_scalar();
            }

            if let Some(interval) = options.rescale_interval() {
                if at_checkpoint(t, steps, interval) {
                    for (term, &v) in terms.iter_mut().zip(&next[n * c..n * c + c]) {
                        *term = S::from_scalar(v);
                    }
                    let z = S::sum(&terms);
                    if !z.is_zero() {
                        for v in next[n * c..n * c + c].iter_mut() {
                            *v = S::from_scalar(*v).div(z).to_scalar();
                        }
                        carry[n] = S::from_scalar(carry[n]).mul(z).to_scalar();
                    }
                }
            }
        }
    }
}

macro_rules! forward_prob_impl {
    ($name:ident, $t:ty) => {
        /// Probability-domain recurrence between rescale checkpoints.
        fn $name(
            steps: usize,
            batch: usize,
            c: usize,
            data: &[$t],
            alpha: &mut [$t],
            carry: &mut [$t],
            interval: usize,
        ) {
            use faer::Mat;

            for n in 0..batch {
                let mut p: Vec<$t> = (0..c).map(|i| alpha[n * c + i].exp()).collect();
                for t in 0..steps {
                    let base = (t * batch + n) * c * c;
                    let m = Mat::<$t>::from_fn(c, c, |to, from| data[base + to * c + from].exp());
                    let v = Mat::<$t>::from_fn(c, 1, |i, _| p[i]);
                    let out = &m * &v;
                    for (i, x) in p.iter_mut().enumerate() {
                        *x = out[(i, 0)];
                    }

                    if at_checkpoint(t, steps, interval) {
                        let z: $t = p.iter().sum();
                        if z > 0.0 {
                            for x in p.iter_mut() {
                                *x /= z;
                            }
                            carry[n] += z.ln();
                        }
                    }

                    let off = ((t + 1) * batch + n) * c;
                    for (i, x) in p.iter().enumerate() {
                        alpha[off + i] = x.ln();
                    }
                }
            }
        }
    };
}

forward_prob_impl!(forward_prob_f32, f32);
forward_prob_impl!(forward_prob_f64, f64);

/// Fold forward and backward scores into the per-transition gradient.
///
/// For each step `t` and edge `(to ← from)` the unnormalized marginal is
/// `M[t][to][from] ⊗ alpha[t][from] ⊗ beta[t+1][to]`; `dsum` over the
/// flattened edge axis per `(t, n)` converts marginals into the exact
/// derivative of the partition, which is then scaled by the upstream
/// gradient. `beta` is the buffer produced by scanning the
/// reversed-transposed sequence, so the backward score for time `t+1`
/// lives at reversed row `T-1-t`.
pub(crate) fn combine<S: Semiring>(
    seq: &DenseSeq<S::Scalar>,
    alpha: &[S::Scalar],
    beta: &[S::Scalar],
    upstream: &[S::Scalar],
) -> Vec<S::Scalar> {
    let (steps, batch, c) = (seq.steps(), seq.batch(), seq.states());
    let mut grad = vec![<S::Scalar as num_traits::Zero>::zero(); seq.data().len()];
    let mut vals = vec![S::zero(); c * c];
    let mut weights = vec![<S::Scalar as num_traits::Zero>::zero(); c * c];

    for t in 0..steps {
        for n in 0..batch {
            let a_off = (t * batch + n) * c;
            let b_off = ((steps - 1 - t) * batch + n) * c;
            for to in 0..c {
                let row = seq.row(t, n, to);
                for from in 0..c {
                    vals[to * c + from] = S::from_scalar(row[from])
                        .mul(S::from_scalar(alpha[a_off + from]))
                        .mul(S::from_scalar(beta[b_off + to]));
                }
            }
            S::dsum(&vals, &mut weights);
            let g_off = (t * batch + n) * c * c;
            for (g, &w) in grad[g_off..g_off + c * c].iter_mut().zip(weights.iter()) {
                *g = w * upstream[n];
            }
        }
    }
    grad
}
