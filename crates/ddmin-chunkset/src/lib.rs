//! Ordered, disjoint byte ranges over a fixed original input.
//!
//! A [`ChunkSet`] is the candidate the ddmin search engine hands to the
//! Oracle: an ordered, sorted, disjoint list of [`Chunk`]s into the original
//! input. Every operation here is pure and returns a new `ChunkSet`; nothing
//! ever mutates a chunk set or the original input in place.

pub mod error;

pub use error::{ChunksetError, Result};

use std::cmp::Ordering;

/// A half-open byte range `[start, end)` into the original input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Chunk {
    start: usize,
    end: usize,
}

impl Chunk {
    /// Build a chunk, rejecting empty or inverted ranges.
    pub fn new(start: usize, end: usize) -> Result<Self> {
        if start >= end {
            return Err(ChunksetError::EmptyChunk { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split into `(lower, upper)` halves of size `len/2` and `ceil(len/2)`.
    /// The lower half is `None` if it would be empty (`len == 1`).
    fn split(&self) -> (Option<Chunk>, Chunk) {
        let lower_len = self.len() / 2;
        let mid = self.start + lower_len;
        let upper = Chunk {
            start: mid,
            end: self.end,
        };
        if lower_len == 0 {
            (None, upper)
        } else {
            (
                Some(Chunk {
                    start: self.start,
                    end: mid,
                }),
                upper,
            )
        }
    }
}

/// An ordered, sorted, disjoint sequence of [`Chunk`]s.
///
/// Two `ChunkSet`s are considered equivalent by the Cache iff they
/// [`normalize`](ChunkSet::normalize) to the same sequence; `ChunkSet`
/// derives `Hash`/`Eq` on its normalized invariant directly, so callers must
/// normalize before using a `ChunkSet` as a cache key (the engine always
/// does).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChunkSet {
    chunks: Vec<Chunk>,
}

impl ChunkSet {
    /// Validate and build a chunk set from caller-supplied ranges. Chunks
    /// must already be sorted and disjoint; use this at input boundaries
    /// (CLI, tests), not for engine-internal derivations which maintain the
    /// invariant by construction.
    pub fn new(chunks: Vec<Chunk>, input_len: usize) -> Result<Self> {
        for c in &chunks {
            if c.end > input_len {
                return Err(ChunksetError::OutOfBounds {
                    start: c.start,
                    end: c.end,
                    len: input_len,
                });
            }
        }
        for w in chunks.windows(2) {
            if w[0].end > w[1].start {
                return Err(ChunksetError::NotDisjoint {
                    prev_end: w[0].end,
                    start: w[1].start,
                });
            }
        }
        Ok(Self { chunks })
    }

    /// The initial candidate `T0 = ((0, N))` spec.md §4.6 starts ddmin from.
    pub fn whole(input_len: usize) -> Result<Self> {
        Ok(Self {
            chunks: vec![Chunk::new(0, input_len)?],
        })
    }

    /// Internal constructor for chunk sets the engine derives itself, which
    /// are already known to be sorted and disjoint.
    fn from_sorted_disjoint(chunks: Vec<Chunk>) -> Self {
        debug_assert!(chunks.windows(2).all(|w| w[0].end <= w[1].start));
        Self { chunks }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// `size(T) = sum of chunk lengths`.
    pub fn size(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }

    /// Merge adjacent chunks where `c[i].end == c[i+1].start`.
    pub fn normalize(&self) -> Self {
        let mut merged: Vec<Chunk> = Vec::with_capacity(self.chunks.len());
        for &c in &self.chunks {
            match merged.last_mut() {
                Some(prev) if prev.end == c.start => {
                    prev.end = c.end;
                }
                _ => merged.push(c),
            }
        }
        Self::from_sorted_disjoint(merged)
    }

    /// `T \ {c_i}`: every chunk except the one at `index`.
    pub fn remove_index(&self, index: usize) -> Result<Self> {
        if index >= self.chunks.len() {
            return Err(ChunksetError::IndexOutOfRange {
                index,
                len: self.chunks.len(),
            });
        }
        let chunks = self
            .chunks
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, c)| *c)
            .collect();
        Ok(Self::from_sorted_disjoint(chunks))
    }

    /// `(c_i,)`: a chunk set containing only the chunk at `index`.
    pub fn singleton(&self, index: usize) -> Result<Self> {
        let c = *self
            .chunks
            .get(index)
            .ok_or(ChunksetError::IndexOutOfRange {
                index,
                len: self.chunks.len(),
            })?;
        Ok(Self::from_sorted_disjoint(vec![c]))
    }

    /// The granularity-increase step of spec.md §3: split every chunk into
    /// two halves, dropping a leading half of size zero. Doubles (at most)
    /// the number of non-empty chunks.
    pub fn split_all_halves(&self) -> Self {
        let mut chunks = Vec::with_capacity(self.chunks.len() * 2);
        for c in &self.chunks {
            let (lower, upper) = c.split();
            if let Some(lower) = lower {
                chunks.push(lower);
            }
            chunks.push(upper);
        }
        Self::from_sorted_disjoint(chunks)
    }

    /// Concatenate the byte slices named by this chunk set, in order. This
    /// is the "materialization" of spec.md §3; the [`Materializer`] crate
    /// wraps this with tempfile I/O.
    ///
    /// [`Materializer`]: https://docs.rs/ddmin-materializer
    pub fn materialize(&self, original: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        for c in &self.chunks {
            out.extend_from_slice(&original[c.start..c.end]);
        }
        out
    }
}

impl PartialOrd for Chunk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(start: usize, end: usize) -> Chunk {
        Chunk::new(start, end).unwrap()
    }

    #[test]
    fn whole_is_single_chunk() {
        let t = ChunkSet::whole(10).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.size(), 10);
    }

    #[test]
    fn rejects_overlap() {
        let err = ChunkSet::new(vec![c(0, 5), c(3, 8)], 10);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_out_of_bounds() {
        let err = ChunkSet::new(vec![c(0, 20)], 10);
        assert!(err.is_err());
    }

    #[test]
    fn normalize_merges_adjacent() {
        let t = ChunkSet::new(vec![c(0, 3), c(3, 6), c(8, 10)], 10).unwrap();
        let n = t.normalize();
        assert_eq!(n.chunks(), &[c(0, 6), c(8, 10)]);
    }

    #[test]
    fn normalize_is_idempotent() {
        let t = ChunkSet::new(vec![c(0, 3), c(3, 6), c(8, 10)], 10).unwrap();
        assert_eq!(t.normalize(), t.normalize().normalize());
    }

    #[test]
    fn remove_index_drops_one_chunk() {
        let t = ChunkSet::new(vec![c(0, 2), c(4, 6), c(8, 10)], 10).unwrap();
        let r = t.remove_index(1).unwrap();
        assert_eq!(r.chunks(), &[c(0, 2), c(8, 10)]);
        assert!(r.size() < t.size());
    }

    #[test]
    fn singleton_picks_one_chunk() {
        let t = ChunkSet::new(vec![c(0, 2), c(4, 6)], 10).unwrap();
        let s = t.singleton(1).unwrap();
        assert_eq!(s.chunks(), &[c(4, 6)]);
    }

    #[test]
    fn split_all_halves_doubles_chunks() {
        let t = ChunkSet::new(vec![c(0, 4), c(10, 14)], 20).unwrap();
        let split = t.split_all_halves();
        assert_eq!(split.chunks(), &[c(0, 2), c(2, 4), c(10, 12), c(12, 14)]);
    }

    #[test]
    fn split_drops_empty_leading_half() {
        // A chunk of length 1 splits into (None, whole chunk): no empty chunk survives.
        let t = ChunkSet::new(vec![c(0, 1)], 10).unwrap();
        let split = t.split_all_halves();
        assert_eq!(split.chunks(), &[c(0, 1)]);
        assert!(split.chunks().iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn split_all_halves_never_produces_empty_chunks() {
        for len in 1..64usize {
            let t = ChunkSet::whole(len).unwrap();
            let mut cur = t;
            for _ in 0..8 {
                cur = cur.split_all_halves();
                assert!(cur.chunks().iter().all(|c| !c.is_empty()));
                assert!(cur.chunks().windows(2).all(|w| w[0].end <= w[1].start));
            }
        }
    }

    #[test]
    fn materialize_round_trips() {
        let original = b"abcdefghij".to_vec();
        let t = ChunkSet::new(vec![c(0, 2), c(5, 8)], original.len()).unwrap();
        assert_eq!(t.materialize(&original), b"abfgh".to_vec());
    }

    #[test]
    fn size_decreases_strictly_on_remove() {
        let t = ChunkSet::new(vec![c(0, 2), c(4, 6), c(8, 10)], 10).unwrap();
        assert!(t.remove_index(0).unwrap().size() < t.size());
    }
}
