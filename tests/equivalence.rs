//! Cross-implementation equivalence: dense vs sparse structure, and
//! rescaled vs plain recurrences.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use seqring::{
    Cpu, DenseSeq, Engine, IndexTable, Log, Max, ScanOptions, Semiring, SparseSeq, Transitions,
};

fn random_sparse(
    steps: usize,
    batch: usize,
    c: usize,
    nz: usize,
    seed: u64,
) -> (SparseSeq<f64>, Vec<f64>, Vec<f64>) {
    let idx = IndexTable::banded(c, nz).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f64> = (0..steps * batch * c * nz)
        .map(|_| rng.gen_range(-3.0..0.0))
        .collect();
    let v0: Vec<f64> = (0..batch * c).map(|_| rng.gen_range(-2.0..0.0)).collect();
    let vt: Vec<f64> = (0..batch * c).map(|_| rng.gen_range(-2.0..0.0)).collect();
    (SparseSeq::new(steps, batch, idx, data).unwrap(), v0, vt)
}

fn assert_close(a: &[f64], b: &[f64], tol: f64, what: &str) {
    assert_eq!(a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        assert!((x - y).abs() < tol, "{}[{}]: {} vs {}", what, i, x, y);
    }
}

fn sparse_vs_dense<S: Semiring<Scalar = f64>>(seed: u64) {
    let (steps, batch, c, nz) = (6, 2, 5, 3);
    let (sparse, v0, vt) = random_sparse(steps, batch, c, nz, seed);
    let dense = sparse.densify::<S>();
    let idx = sparse.index().clone();

    let engine = Engine::default();
    let sparse_t: Transitions<f64> = sparse.into();
    let dense_t: Transitions<f64> = dense.into();

    let se = engine.forward::<S>(&sparse_t, &v0, &vt).unwrap();
    let de = engine.forward::<S>(&dense_t, &v0, &vt).unwrap();
    assert_close(se.log_partition(), de.log_partition(), 1e-9, "logZ");

    let upstream = vec![1.0; batch];
    let sg = se.gradient(&upstream).unwrap();
    let dg = de.gradient(&upstream).unwrap();

    // the dense gradient must agree entry-wise on the sparse structure
    // and vanish off it
    let mut seen = vec![false; steps * batch * c * c];
    for t in 0..steps {
        for n in 0..batch {
            for to in 0..c {
                for k in 0..nz {
                    let from = idx.entry(to, k) as usize;
                    let si = ((t * batch + n) * c + to) * nz + k;
                    let di = ((t * batch + n) * c + to) * c + from;
                    assert!(
                        (sg[si] - dg[di]).abs() < 1e-9,
                        "grad ({}, {}, {}, {}): {} vs {}",
                        t,
                        n,
                        to,
                        k,
                        sg[si],
                        dg[di]
                    );
                    seen[di] = true;
                }
            }
        }
    }
    for (i, &g) in dg.iter().enumerate() {
        if !seen[i] {
            assert_eq!(g, 0.0, "gradient off the sparse structure at {}", i);
        }
    }
}

#[test]
fn test_sparse_matches_dense_log() {
    sparse_vs_dense::<Log<f64>>(41);
}

#[test]
fn test_sparse_matches_dense_max() {
    sparse_vs_dense::<Max<f64>>(43);
}

#[test]
fn test_rescale_interval_is_neutral() {
    let (steps, batch, c) = (12, 2, 4);
    let mut rng = StdRng::seed_from_u64(47);
    let data: Vec<f64> = (0..steps * batch * c * c)
        .map(|_| rng.gen_range(-4.0..0.0))
        .collect();
    let v0: Vec<f64> = (0..batch * c).map(|_| rng.gen_range(-2.0..0.0)).collect();
    let vt: Vec<f64> = (0..batch * c).map(|_| rng.gen_range(-2.0..0.0)).collect();
    let seq = DenseSeq::new(steps, batch, c, data).unwrap();
    let transitions: Transitions<f64> = seq.into();

    let variants = [
        ScanOptions::no_rescale(),
        ScanOptions::rescale_every(1),
        ScanOptions::rescale_every(5),
        ScanOptions::rescale_every(steps),
        ScanOptions::rescale_every(10 * steps),
    ];

    let reference = Engine::with_options(Cpu, variants[0])
        .evaluate::<Log<f64>>(&transitions, &v0, &vt)
        .unwrap();
    for options in &variants[1..] {
        let logz = Engine::with_options(Cpu, *options)
            .evaluate::<Log<f64>>(&transitions, &v0, &vt)
            .unwrap();
        assert_close(&reference, &logz, 1e-9, "logZ");
    }

    // the max-plus recurrence rescales by the running maximum; equally
    // neutral
    let reference = Engine::with_options(Cpu, variants[0])
        .evaluate::<Max<f64>>(&transitions, &v0, &vt)
        .unwrap();
    for options in &variants[1..] {
        let best = Engine::with_options(Cpu, *options)
            .evaluate::<Max<f64>>(&transitions, &v0, &vt)
            .unwrap();
        assert_close(&reference, &best, 1e-9, "viterbi");
    }
}

#[test]
fn test_long_chain_stays_finite_with_rescaling() {
    // 300 steps of strongly negative weights: the probability-domain
    // recurrence underflows without checkpoints tight enough, but the
    // accumulated carry keeps the result finite and correct
    let (steps, c) = (300, 3);
    let mut rng = StdRng::seed_from_u64(53);
    let data: Vec<f64> = (0..steps * c * c)
        .map(|_| rng.gen_range(-8.0..-4.0))
        .collect();
    let v0 = vec![0.0; c];
    let vt = vec![0.0; c];
    let seq = DenseSeq::new(steps, 1, c, data).unwrap();
    let transitions: Transitions<f64> = seq.into();

    let plain = Engine::with_options(Cpu, ScanOptions::no_rescale())
        .evaluate::<Log<f64>>(&transitions, &v0, &vt)
        .unwrap();
    let rescaled = Engine::with_options(Cpu, ScanOptions::rescale_every(8))
        .evaluate::<Log<f64>>(&transitions, &v0, &vt)
        .unwrap();

    assert!(plain[0].is_finite());
    assert!((plain[0] - rescaled[0]).abs() < 1e-6 * plain[0].abs());
}
