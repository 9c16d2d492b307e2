//! Data model for chain-structured transition sequences.
//!
//! A chain is an ordered sequence of `T` steps. Each step holds, per batch
//! element `n` and target state `c`, either a full row of `C` source-state
//! weights ([`DenseSeq`]) or `NZ ≤ C` weights plus a shared [`IndexTable`]
//! naming the source states they connect from ([`SparseSeq`]).
//!
//! The index table is a structural property of the automaton: it is shared
//! across all batch elements and all steps, validated once, and reused
//! unchanged for the whole scan.

use crate::algebra::{Scalar, Semiring};
use crate::backend::Structure;
use crate::error::{Error, Result};

// ============================================================================
// Index table
// ============================================================================

/// Fixed fan-in connectivity of a sparse chain, shape `C × NZ`.
///
/// `entry(to, k)` is the source state of the `k`-th incoming edge of state
/// `to`. Entries are validated against the state count at construction.
///
/// # Example
///
/// ```rust
/// use seqring::chain::IndexTable;
///
/// // three states, each fed only by itself (a pure identity chain)
/// let idx = IndexTable::new(3, 1, vec![0, 1, 2]).unwrap();
/// assert_eq!(idx.entry(2, 0), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTable {
    states: usize,
    nz: usize,
    entries: Vec<u32>,
}

impl IndexTable {
    /// Validate and build a table from row-major `C × NZ` entries.
    pub fn new(states: usize, nz: usize, entries: Vec<u32>) -> Result<Self> {
        if entries.len() != states * nz {
            return Err(Error::Shape {
                what: "index table",
                expected: states * nz,
                got: entries.len(),
            });
        }
        for &e in &entries {
            if e as usize >= states {
                return Err(Error::Index {
                    entry: e,
                    states,
                });
            }
        }
        Ok(Self {
            states,
            nz,
            entries,
        })
    }

    /// Banded table where state `c` is fed by `c, c-1, ..., c-(nz-1)`,
    /// wrapping modulo `C`.
    ///
    /// This is the connectivity of label/blank interleaved chains, where
    /// each state can be entered from itself and a small window of
    /// predecessors.
    pub fn banded(states: usize, nz: usize) -> Result<Self> {
        let mut entries = Vec::with_capacity(states * nz);
        for to in 0..states {
            for k in 0..nz {
                entries.push(((to + states - k % states) % states) as u32);
            }
        }
        Self::new(states, nz, entries)
    }

    /// Number of states `C`.
    #[inline]
    pub fn states(&self) -> usize {
        self.states
    }

    /// Fan-in `NZ`.
    #[inline]
    pub fn nz(&self) -> usize {
        self.nz
    }

    /// Flat row-major entries, length `C × NZ`.
    #[inline]
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    /// Source state of edge `(to, k)`.
    #[inline]
    pub fn entry(&self, to: usize, k: usize) -> u32 {
        self.entries[to * self.nz + k]
    }

    /// Transpose the connectivity, swapping source and target roles.
    ///
    /// The backward scan runs the forward kernel over the reversed
    /// sequence with edges flipped; this computes the flipped table plus
    /// the permutation that gathers each step's flat `C × NZ` weights into
    /// transposed order.
    ///
    /// Fails with [`Error::Fanout`] unless every source state appears
    /// exactly `NZ` times, i.e. fan-out is as uniform as fan-in.
    pub fn transpose(&self) -> Result<TransposedIndex> {
        let flat = &self.entries;
        let mut perm: Vec<u32> = (0..flat.len() as u32).collect();
        perm.sort_by_key(|&j| flat[j as usize]);

        // uniform fan-out check: after sorting, position s*nz + k must
        // hold an edge out of source state s
        for s in 0..self.states {
            for k in 0..self.nz {
                let src = flat[perm[s * self.nz + k] as usize] as usize;
                if src != s {
                    let count = flat.iter().filter(|&&e| e as usize == s).count();
                    return Err(Error::Fanout {
                        state: s,
                        count,
                        nz: self.nz,
                    });
                }
            }
        }

        // edge j = perm[s*nz + k] ran idx[j] -> j/nz; transposed it runs
        // j/nz -> s
        let entries: Vec<u32> = perm.iter().map(|&j| j / self.nz as u32).collect();
        let table = IndexTable::new(self.states, self.nz, entries)?;
        Ok(TransposedIndex { table, perm })
    }
}

/// Transposed connectivity plus the weight-gather permutation.
#[derive(Debug, Clone)]
pub struct TransposedIndex {
    /// Fan-in table of the transposed automaton.
    pub table: IndexTable,
    /// For flat transposed edge `j`, `perm[j]` is the flat position of the
    /// same edge in the original `C × NZ` layout.
    pub perm: Vec<u32>,
}

// ============================================================================
// Dense sequence
// ============================================================================

/// Dense transition sequence, row-major `[T, N, C, C]`.
///
/// Entry `(t, n, to, from)` is the weight of moving from state `from` to
/// state `to` at step `t` for batch element `n`.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseSeq<T: Scalar> {
    data: Vec<T>,
    steps: usize,
    batch: usize,
    states: usize,
}

impl<T: Scalar> DenseSeq<T> {
    /// Validate and build a sequence from flat row-major data.
    pub fn new(steps: usize, batch: usize, states: usize, data: Vec<T>) -> Result<Self> {
        let expected = steps * batch * states * states;
        if data.len() != expected {
            return Err(Error::Shape {
                what: "dense step weights",
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            steps,
            batch,
            states,
        })
    }

    /// Sequence length `T`.
    #[inline]
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Batch size `N`.
    #[inline]
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// State count `C`.
    #[inline]
    pub fn states(&self) -> usize {
        self.states
    }

    /// Flat weight data.
    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Row of source weights for `(t, n, to)`, length `C`.
    #[inline]
    pub fn row(&self, t: usize, n: usize, to: usize) -> &[T] {
        let c = self.states;
        let off = ((t * self.batch + n) * c + to) * c;
        &self.data[off..off + c]
    }

    /// Weight of the edge `(t, n, to, from)`.
    #[inline]
    pub fn at(&self, t: usize, n: usize, to: usize, from: usize) -> T {
        self.row(t, n, to)[from]
    }

    /// Time-reversed sequence with every step matrix transposed.
    ///
    /// Scanning this with the final boundary as seed yields the backward
    /// scores of the original chain.
    pub fn reversed_transpose(&self) -> Self {
        let (steps, batch, c) = (self.steps, self.batch, self.states);
        let mut data = vec![T::default(); self.data.len()];
        for t in 0..steps {
            let src_t = steps - 1 - t;
            for n in 0..batch {
                for to in 0..c {
                    let off = ((t * batch + n) * c + to) * c;
                    for from in 0..c {
                        data[off + from] = self.at(src_t, n, from, to);
                    }
                }
            }
        }
        Self {
            data,
            steps,
            batch,
            states: c,
        }
    }
}

// ============================================================================
// Sparse sequence
// ============================================================================

/// Sparse (banded) transition sequence, row-major `[T, N, C, NZ]` weights
/// plus a shared [`IndexTable`].
///
/// Only the weight values are per-step payload; the connectivity is
/// structural and shared across `T` and `N`.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseSeq<T: Scalar> {
    data: Vec<T>,
    steps: usize,
    batch: usize,
    index: IndexTable,
}

impl<T: Scalar> SparseSeq<T> {
    /// Validate and build a sequence from flat row-major data.
    pub fn new(steps: usize, batch: usize, index: IndexTable, data: Vec<T>) -> Result<Self> {
        let expected = steps * batch * index.states() * index.nz();
        if data.len() != expected {
            return Err(Error::Shape {
                what: "sparse step weights",
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            steps,
            batch,
            index,
        })
    }

    /// Sequence length `T`.
    #[inline]
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Batch size `N`.
    #[inline]
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// State count `C`.
    #[inline]
    pub fn states(&self) -> usize {
        self.index.states()
    }

    /// Fan-in `NZ`.
    #[inline]
    pub fn nz(&self) -> usize {
        self.index.nz()
    }

    /// Connectivity table.
    #[inline]
    pub fn index(&self) -> &IndexTable {
        &self.index
    }

    /// Flat weight data.
    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Incoming edge weights for `(t, n, to)`, length `NZ`.
    #[inline]
    pub fn row(&self, t: usize, n: usize, to: usize) -> &[T] {
        let width = self.states() * self.nz();
        let off = (t * self.batch + n) * width + to * self.nz();
        &self.data[off..off + self.nz()]
    }

    /// Flat `C × NZ` block for `(t, n)`.
    #[inline]
    pub fn block(&self, t: usize, n: usize) -> &[T] {
        let width = self.states() * self.nz();
        let off = (t * self.batch + n) * width;
        &self.data[off..off + width]
    }

    /// Time-reversed sequence over the transposed connectivity.
    ///
    /// Fails if the index table is not transposable (non-uniform fan-out).
    pub fn reversed_transpose(&self) -> Result<Self> {
        let transposed = self.index.transpose()?;
        let (steps, batch) = (self.steps, self.batch);
        let width = self.states() * self.nz();
        let mut data = vec![T::default(); self.data.len()];
        for t in 0..steps {
            for n in 0..batch {
                let src = self.block(steps - 1 - t, n);
                let off = (t * batch + n) * width;
                for (j, &p) in transposed.perm.iter().enumerate() {
                    data[off + j] = src[p as usize];
                }
            }
        }
        Self::new(steps, batch, transposed.table, data)
    }

    /// Expand to an equivalent [`DenseSeq`], combining duplicate edges
    /// with the semiring's ⊕.
    pub fn densify<S: Semiring<Scalar = T>>(&self) -> DenseSeq<T> {
        let (steps, batch, c, nz) = (self.steps, self.batch, self.states(), self.nz());
        let mut data = vec![S::zero().to_scalar(); steps * batch * c * c];
        for t in 0..steps {
            for n in 0..batch {
                for to in 0..c {
                    let row = self.row(t, n, to);
                    let off = ((t * batch + n) * c + to) * c;
                    for k in 0..nz {
                        let from = self.index.entry(to, k) as usize;
                        let cur = S::from_scalar(data[off + from]);
                        data[off + from] = cur.add(S::from_scalar(row[k])).to_scalar();
                    }
                }
            }
        }
        DenseSeq {
            data,
            steps,
            batch,
            states: c,
        }
    }
}

// ============================================================================
// Unified payload
// ============================================================================

/// Step weights of a chain, dense or sparse.
///
/// This is the payload accepted by the forward-backward engine; both
/// variants obey the same scan contract.
#[derive(Debug, Clone)]
pub enum Transitions<T: Scalar> {
    /// Unrestricted `C × C` transitions per step.
    Dense(DenseSeq<T>),
    /// Fixed fan-in `NZ` transitions per step.
    Sparse(SparseSeq<T>),
}

impl<T: Scalar> Transitions<T> {
    /// `(T, N, C)` dimensions.
    pub fn dims(&self) -> (usize, usize, usize) {
        match self {
            Transitions::Dense(d) => (d.steps(), d.batch(), d.states()),
            Transitions::Sparse(s) => (s.steps(), s.batch(), s.states()),
        }
    }

    /// Structural tag for kernel-registry lookups.
    pub fn structure(&self) -> Structure {
        match self {
            Transitions::Dense(_) => Structure::Dense,
            Transitions::Sparse(_) => Structure::Sparse,
        }
    }

    /// Number of weight entries (the shape of the gradient tensor).
    pub fn len(&self) -> usize {
        match self {
            Transitions::Dense(d) => d.data().len(),
            Transitions::Sparse(s) => s.data().len(),
        }
    }

    /// Whether the sequence holds no weights.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Scalar> From<DenseSeq<T>> for Transitions<T> {
    fn from(d: DenseSeq<T>) -> Self {
        Transitions::Dense(d)
    }
}

impl<T: Scalar> From<SparseSeq<T>> for Transitions<T> {
    fn from(s: SparseSeq<T>) -> Self {
        Transitions::Sparse(s)
    }
}
