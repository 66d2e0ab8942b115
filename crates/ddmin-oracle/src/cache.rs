//! Memoizes Oracle verdicts for the lifetime of one ddmin run (spec.md §4.6:
//! "the engine never re-queries the Oracle for a chunk set it has already
//! classified").

use ddmin_chunkset::ChunkSet;
use std::collections::HashMap;

/// `true` means the candidate reproduces the failure (FAIL).
#[derive(Default)]
pub struct Cache {
    verdicts: HashMap<ChunkSet, bool>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a verdict, normalizing `chunkset` first so that
    /// differently-ordered-but-equivalent chunk sets hit the same entry.
    pub fn get(&self, chunkset: &ChunkSet) -> Option<bool> {
        self.verdicts.get(&chunkset.normalize()).copied()
    }

    pub fn insert(&mut self, chunkset: &ChunkSet, is_failure: bool) {
        self.verdicts.insert(chunkset.normalize(), is_failure);
    }

    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }
}
