//! End-to-end run over a label/blank interleaved chain, the banded
//! structure used by alignment losses: each state can be entered from
//! itself, its predecessor, and the state two back when that does not
//! collapse a repeated label.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use seqring::{
    DenseSeq, Engine, IndexTable, Log, Max, Semiring, SparseSeq, Transitions,
};

const BLANK: usize = 0;

/// Interleave blanks around a label sequence: `[l1, l2]` becomes
/// `[blank, l1, blank, l2, blank]`.
fn interleave_blanks(labels: &[usize]) -> Vec<usize> {
    let mut states = vec![BLANK];
    for &l in labels {
        states.push(l);
        states.push(BLANK);
    }
    states
}

/// Per-step log-probabilities over the alphabet, normalized per step.
fn random_scores(steps: usize, alphabet: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    (0..steps)
        .map(|_| {
            let logits: Vec<f64> = (0..alphabet).map(|_| rng.gen_range(-2.0..2.0)).collect();
            let z = logits.iter().map(|x| x.exp()).sum::<f64>().ln();
            logits.iter().map(|x| x - z).collect()
        })
        .collect()
}

/// Build the banded transition sequence for one batch element.
fn build_chain(
    scores: &[Vec<f64>],
    labels: &[usize],
) -> (SparseSeq<f64>, Vec<f64>, Vec<f64>) {
    let states = interleave_blanks(labels);
    let lp = states.len();
    let steps = scores.len();
    let zero = f64::NEG_INFINITY;

    let idx = IndexTable::banded(lp, 3).unwrap();
    let mut data = Vec::with_capacity(steps * lp * 3);
    for row in scores.iter().take(steps) {
        for (s, &state) in states.iter().enumerate() {
            let emit = row[state];
            data.push(emit); // stay
            data.push(if s >= 1 { emit } else { zero }); // advance
            // skip a blank, unless it would merge a repeated label
            data.push(if s >= 2 && states[s] != states[s - 2] {
                emit
            } else {
                zero
            });
        }
    }

    let mut v0 = vec![zero; lp];
    v0[0] = 0.0;
    let mut vt = vec![zero; lp];
    vt[lp - 1] = 0.0;
    vt[lp - 2] = 0.0;

    (
        SparseSeq::new(steps, 1, idx, data).unwrap(),
        v0,
        vt,
    )
}

/// Exhaustive path-sum oracle over the dense expansion.
fn brute_force<S: Semiring<Scalar = f64>>(seq: &DenseSeq<f64>, v0: &[f64], vt: &[f64]) -> f64 {
    let (steps, c) = (seq.steps(), seq.states());
    let mut total = S::zero();
    for p in 0..c.pow(steps as u32 + 1) {
        let mut digits = p;
        let mut path = Vec::with_capacity(steps + 1);
        for _ in 0..=steps {
            path.push(digits % c);
            digits /= c;
        }
        let mut w = S::from_scalar(v0[path[0]]);
        for t in 0..steps {
            w = w.mul(S::from_scalar(seq.at(t, 0, path[t + 1], path[t])));
        }
        w = w.mul(S::from_scalar(vt[path[steps]]));
        total = total.add(w);
    }
    total.to_scalar()
}

#[test]
fn test_chain_partition_matches_brute_force() {
    let mut rng = StdRng::seed_from_u64(61);
    let labels = [1, 2, 1];
    let scores = random_scores(4, 4, &mut rng);
    let (sparse, v0, vt) = build_chain(&scores, &labels);
    let dense = sparse.densify::<Log<f64>>();

    let engine = Engine::default();
    let logz = engine
        .evaluate::<Log<f64>>(&sparse.into(), &v0, &vt)
        .unwrap();
    let expected = brute_force::<Log<f64>>(&dense, &v0, &vt);
    assert!(
        (logz[0] - expected).abs() < 1e-9,
        "{} vs {}",
        logz[0],
        expected
    );
}

#[test]
fn test_chain_viterbi_matches_brute_force() {
    let mut rng = StdRng::seed_from_u64(67);
    let labels = [2, 3];
    let scores = random_scores(5, 4, &mut rng);
    let (sparse, v0, vt) = build_chain(&scores, &labels);
    let dense = sparse.densify::<Max<f64>>();

    let engine = Engine::default();
    let best = engine
        .evaluate::<Max<f64>>(&sparse.into(), &v0, &vt)
        .unwrap();
    let expected = brute_force::<Max<f64>>(&dense, &v0, &vt);
    assert!((best[0] - expected).abs() < 1e-9);
}

#[test]
fn test_chain_gradient_is_a_posterior() {
    let mut rng = StdRng::seed_from_u64(71);
    let labels = [1, 2];
    let scores = random_scores(6, 3, &mut rng);
    let (sparse, v0, vt) = build_chain(&scores, &labels);
    let lp = sparse.states();
    let nz = sparse.nz();
    let steps = sparse.steps();
    let transitions: Transitions<f64> = sparse.into();

    let engine = Engine::default();
    let eval = engine.forward::<Log<f64>>(&transitions, &v0, &vt).unwrap();
    let grad = eval.gradient(&[1.0]).unwrap();

    for t in 0..steps {
        let off = t * lp * nz;
        let block = &grad[off..off + lp * nz];
        // a proper posterior: non-negative, sums to one per step
        assert!(block.iter().all(|&g| g >= 0.0));
        let total: f64 = block.iter().sum();
        assert!((total - 1.0).abs() < 1e-9, "step {}: {}", t, total);
    }
}

#[test]
fn test_repeated_label_blocks_the_skip() {
    // labels [1, 1]: the skip into the second 1 would merge the repeat,
    // so its weight must be the zero element
    let mut rng = StdRng::seed_from_u64(73);
    let scores = random_scores(3, 2, &mut rng);
    let (sparse, _, _) = build_chain(&scores, &[1, 1]);
    // states: [0, 1, 0, 1, 0]; state 3 (second label 1) has states[3] ==
    // states[1], so its skip edge is dead
    for t in 0..sparse.steps() {
        assert_eq!(sparse.row(t, 0, 3)[2], f64::NEG_INFINITY);
        // the first label's skip edge is alive only where the landing
        // differs; state 2 (blank) skipping from state 0 (blank) is dead
        assert_eq!(sparse.row(t, 0, 2)[2], f64::NEG_INFINITY);
    }
}

#[test]
fn test_best_alignment_bounded_by_partition() {
    let mut rng = StdRng::seed_from_u64(79);
    let labels = [3, 1, 2];
    let scores = random_scores(8, 4, &mut rng);
    let (sparse, v0, vt) = build_chain(&scores, &labels);
    let transitions: Transitions<f64> = sparse.into();

    let engine = Engine::default();
    let logz = engine
        .evaluate::<Log<f64>>(&transitions, &v0, &vt)
        .unwrap();
    let best = engine
        .evaluate::<Max<f64>>(&transitions, &v0, &vt)
        .unwrap();
    assert!(best[0] <= logz[0]);
    assert!(best[0].is_finite());
}
