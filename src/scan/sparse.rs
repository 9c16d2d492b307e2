//! Sparse O(T·C·NZ) forward scan for banded chains.

use crate::algebra::Semiring;
use crate::chain::SparseSeq;
use crate::error::{Error, Result};

/// Run the sparse forward recurrence.
///
/// `alpha` is `(T+1) × N × C` with row 0 seeded by the caller. Each target
/// state reduces over its fixed `NZ` incoming edges:
/// `alpha[t+1][c] = sum_k( M[t][c][k] ⊗ alpha[t][idx[c][k]] )`.
///
/// The log-domain recurrence is numerically stable on its own, so there
/// is no rescaling here; the fan-in is small and the reduction never
/// accumulates more than `NZ` terms per state.
pub fn forward<S: Semiring>(seq: &SparseSeq<S::Scalar>, alpha: &mut [S::Scalar]) -> Result<()> {
    let (steps, batch, c, nz) = (seq.steps(), seq.batch(), seq.states(), seq.nz());
    let expected = (steps + 1) * batch * c;
    if alpha.len() != expected {
        return Err(Error::Shape {
            what: "alpha buffer",
            expected,
            got: alpha.len(),
        });
    }

    let idx = seq.index().entries();
    let mut terms = vec![S::zero(); nz];

    for t in 0..steps {
        let (head, tail) = alpha.split_at_mut((t + 1) * batch * c);
        let prev = &head[t * batch * c..];
        let next = &mut tail[..batch * c];

        for n in 0..batch {
            for to in 0..c {
                let row = seq.row(t, n, to);
                for k in 0..nz {
                    let from = idx[to * nz + k] as usize;
                    terms[k] = S::from_scalar(row[k]).mul(S::from_scalar(prev[n * c + from]));
                }
                next[n * c + to] = S::sum(&terms).to_scalar();
            }
        }
    }
    Ok(())
}

/// Fold forward and backward scores into the per-transition gradient.
///
/// Mirrors the dense combine over the `C × NZ` edge layout: the marginal
/// of edge `(t, to, k)` is `M[t][to][k] ⊗ alpha[t][idx[to][k]] ⊗
/// beta[t+1][to]`, reduced by `dsum` over the flattened edge axis per
/// `(t, n)` and scaled by the upstream gradient.
pub(crate) fn combine<S: Semiring>(
    seq: &SparseSeq<S::Scalar>,
    alpha: &[S::Scalar],
    beta: &[S::Scalar],
    upstream: &[S::Scalar],
) -> Vec<S::Scalar> {
    let (steps, batch, c, nz) = (seq.steps(), seq.batch(), seq.states(), seq.nz());
    let idx = seq.index().entries();
    let mut grad = vec![<S::Scalar as num_traits::Zero>::zero(); seq.data().len()];
    let mut vals = vec![S::zero(); c * nz];
    let mut weights = vec![<S::Scalar as num_traits::Zero>::zero(); c * nz];

    for t in 0..steps {
        for n in 0..batch {
            let a_off = (t * batch + n) * c;
            let b_off = ((steps - 1 - t) * batch + n) * c;
            for to in 0..c {
                let row = seq.row(t, n, to);
                for k in 0..nz {
                    let from = idx[to * nz + k] as usize;
                    vals[to * nz + k] = S::from_scalar(row[k])
                        .mul(S::from_scalar(alpha[a_off + from]))
                        .mul(S::from_scalar(beta[b_off + to]));
                }
            }
            S::dsum(&vals, &mut weights);
            let g_off = (t * batch + n) * c * nz;
            for (g, &w) in grad[g_off..g_off + c * nz].iter_mut().zip(weights.iter()) {
                *g = w * upstream[n];
            }
        }
    }
    grad
}
