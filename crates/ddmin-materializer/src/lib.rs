//! Writes a [`ChunkSet`] to a fresh temporary file on request and guarantees
//! the file is unlinked when the caller is done with it — on every exit path,
//! including a caller that aborts or panics before calling
//! [`TempCandidate::release`] explicitly.

pub mod error;

pub use error::{MaterializeError, Result};

use ddmin_chunkset::ChunkSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Bounded write buffer size (spec.md §4.2: "≈4 KiB").
const WRITE_BUF_SIZE: usize = 4096;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Writes candidate chunk sets to fresh files under a process-local
/// temporary directory.
pub struct Materializer {
    dir: PathBuf,
}

impl Materializer {
    /// Use the platform temporary directory (`std::env::temp_dir()`).
    pub fn new() -> Self {
        Self::with_dir(std::env::temp_dir())
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Materialize `chunkset` against `original` into a fresh `ddmin-`
    /// prefixed file and return a handle that unlinks the file on drop.
    pub fn write(&self, chunkset: &ChunkSet, original: &[u8]) -> Result<TempCandidate> {
        let path = self.fresh_path();
        let file = File::create(&path).map_err(|source| MaterializeError::Create {
            path: path.clone(),
            source,
        })?;
        let mut writer = BufWriter::with_capacity(WRITE_BUF_SIZE, file);
        for chunk in chunkset.chunks() {
            writer
                .write_all(&original[chunk.start()..chunk.end()])
                .map_err(|source| MaterializeError::Write {
                    path: path.clone(),
                    source,
                })?;
        }
        writer.flush().map_err(|source| MaterializeError::Write {
            path: path.clone(),
            source,
        })?;
        log::debug!("materialized {} bytes to {}", chunkset.size(), path.display());
        Ok(TempCandidate { path })
    }

    fn fresh_path(&self) -> PathBuf {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!("ddmin-{}-{}", std::process::id(), id))
    }
}

impl Default for Materializer {
    fn default() -> Self {
        Self::new()
    }
}

/// A materialized candidate on disk. Unlinked automatically on drop;
/// [`release`](Self::release) unlinks eagerly and reports I/O errors instead
/// of swallowing them, for callers that care whether cleanup succeeded.
pub struct TempCandidate {
    path: PathBuf,
}

impl TempCandidate {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlink the file now. Consumes `self`; the `Drop` impl becomes a no-op
    /// once the file is gone.
    pub fn release(self) -> std::io::Result<()> {
        let path = self.path.clone();
        std::mem::forget(self);
        std::fs::remove_file(path)
    }
}

impl Drop for TempCandidate {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to unlink {}: {}", self.path.display(), e);
            }
        }
    }
}
