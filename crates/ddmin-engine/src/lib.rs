//! The iterative ddmin search loop (spec.md §4.6): reduce-to-subset,
//! reduce-to-complement, increase-granularity, restarting from the top of
//! the step after every successful reduction.
//!
//! The engine owns the [`Cache`] for the lifetime of one run and threads it
//! through every [`Oracle::query`] call, so re-queries made while
//! backtracking between phases are free.

pub mod error;

pub use error::{EngineError, Result};

use ddmin_chunkset::ChunkSet;
use ddmin_oracle::{Cache, Oracle};

/// Runs one ddmin search to a 1-minimal result.
pub struct DdminEngine<'a> {
    oracle: &'a Oracle,
    input_len: usize,
}

impl<'a> DdminEngine<'a> {
    pub fn new(oracle: &'a Oracle, input_len: usize) -> Self {
        Self { oracle, input_len }
    }

    /// Run the search to completion and return the 1-minimal chunk set.
    pub async fn run(&self) -> Result<ChunkSet> {
        let mut cache = Cache::new();
        let mut t = ChunkSet::whole(self.input_len)?;
        // spec.md §4.6: "Initial state: T0 = ((0, N)), n0 = 2."
        let mut n: usize = 2;

        if !self.oracle.query(&t, &mut cache).await? {
            return Err(EngineError::InitialTestDoesNotFail);
        }
        log::info!("initial candidate reproduces the failure ({} bytes)", self.input_len);

        'restart: loop {
            if t.len() > 1 {
                for i in 0..t.len() {
                    let singleton = t.singleton(i)?;
                    if self.oracle.query(&singleton, &mut cache).await? {
                        t = singleton.split_all_halves();
                        n *= 2;
                        log::debug!(
                            "reduce-to-subset: chunk {}/{} alone reproduces, granularity -> {}",
                            i + 1,
                            n / 2,
                            n
                        );
                        continue 'restart;
                    }
                }
            }

            if t.len() > 1 {
                for i in 0..t.len() {
                    let complement = t.remove_index(i)?;
                    if self.oracle.query(&complement, &mut cache).await? {
                        log::debug!(
                            "reduce-to-complement: dropping chunk {}, size {} -> {}",
                            i,
                            t.size(),
                            complement.size()
                        );
                        t = complement;
                        continue 'restart;
                    }
                }
            }

            if n < self.input_len {
                t = t.split_all_halves();
                n *= 2;
                log::debug!("increase granularity -> {} ({} chunks)", n, t.len());
                continue 'restart;
            }

            break;
        }

        let result = t.normalize();
        log::info!(
            "minimized to {} byte(s) across {} chunk(s) ({} oracle queries)",
            result.size(),
            result.len(),
            cache.len()
        );
        Ok(result)
    }
}
