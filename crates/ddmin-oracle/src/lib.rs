//! Runs one candidate under process supervision and classifies the run
//! against a [`FailurePredicate`] (spec.md §4.5).
//!
//! The child is isolated in its own session (`setsid`) so a timeout can kill
//! the whole process group, not just the immediate child. Watched fds are
//! redirected to pipes and polled through [`tokio::io::unix::AsyncFd`]; the
//! entire wait -- for fd readability/EOF or for the child to exit -- happens
//! inside one [`tokio::time::timeout`], so the timeout is the single
//! cancellation point spec.md asks for.

pub mod cache;
pub mod error;
mod fd_watch;

pub use cache::Cache;
pub use error::{OracleError, Result};

use ddmin_chunkset::ChunkSet;
use ddmin_command_template::CommandTemplate;
use ddmin_failure_predicate::FailurePredicate;
use ddmin_materializer::Materializer;
use fd_watch::{FdOutcome, FdWatch};
use futures_util::future::select_all;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::os::unix::io::RawFd;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use tokio::process::Command;

/// Runs a candidate and classifies it FAIL/PASS.
pub struct Oracle {
    original: Vec<u8>,
    materializer: Materializer,
    template: CommandTemplate,
    predicate: FailurePredicate,
}

impl Oracle {
    pub fn new(original: Vec<u8>, template: CommandTemplate, predicate: FailurePredicate) -> Self {
        Self {
            original,
            materializer: Materializer::new(),
            template,
            predicate,
        }
    }

    /// Query the verdict for `chunkset`, consulting and updating `cache`
    /// (spec.md §4.6: the engine threads one `Cache` through an entire run).
    pub async fn query(&self, chunkset: &ChunkSet, cache: &mut Cache) -> Result<bool> {
        if let Some(verdict) = cache.get(chunkset) {
            log::debug!("cache hit for chunk set of size {}", chunkset.size());
            return Ok(verdict);
        }

        let verdict = self.run(chunkset).await?;
        cache.insert(chunkset, verdict);
        Ok(verdict)
    }

    async fn run(&self, chunkset: &ChunkSet) -> Result<bool> {
        let contents = chunkset.materialize(&self.original);
        let candidate = self.materializer.write(chunkset, &self.original)?;
        let invocation = self.template.expand(candidate.path(), &contents)?;

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        cmd.kill_on_drop(true);
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        if self.template.stdin_input() {
            let file = std::fs::File::open(candidate.path()).map_err(OracleError::Io)?;
            cmd.stdin(Stdio::from(file));
        } else {
            cmd.stdin(Stdio::null());
        }

        let watched_fds: HashSet<i32> = self.predicate.writes().iter().map(|(fd, _)| *fd).collect();
        let mut watches = Vec::with_capacity(watched_fds.len());
        let mut dup_targets: Vec<(i32, RawFd)> = Vec::with_capacity(watched_fds.len());

        for fd in watched_fds {
            let (read_fd, write_fd) = nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)
                .map_err(|source| OracleError::Pipe { fd, source })?;
            let patterns: Vec<Vec<u8>> = self
                .predicate
                .writes()
                .iter()
                .filter(|(f, _)| *f == fd)
                .map(|(_, s)| s.clone().into_bytes())
                .collect();
            set_nonblocking(read_fd);
            watches.push(FdWatch::new(fd, read_fd, patterns).map_err(OracleError::Io)?);
            dup_targets.push((fd, write_fd));
        }

        let dup_targets_for_child = dup_targets.clone();
        // SAFETY: only async-signal-safe calls (setsid, dup2) run between
        // fork and exec. The write ends are O_CLOEXEC, so whichever one
        // isn't dup2'd onto a standard fd is closed automatically by exec.
        unsafe {
            cmd.pre_exec(move || {
                libc::setsid();
                for &(fd, write_fd) in &dup_targets_for_child {
                    if libc::dup2(write_fd, fd) < 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                }
                Ok(())
            });
        }

        let spawn_result = cmd.spawn();
        // The parent's own copies of the write ends must be closed now: the
        // child has its own (dup2'd) copies, and as long as the parent keeps
        // one open the pipe never reports EOF.
        for &(_, write_fd) in &dup_targets {
            let _ = nix::unistd::close(write_fd);
        }
        let mut child = match spawn_result {
            Ok(child) => child,
            Err(e) => {
                // No exit status exists to classify; spec.md §7 treats a
                // failed exec as PASS -- the candidate does not reproduce.
                log::debug!("spawn failed, classifying as PASS: {}", e);
                return Ok(false);
            }
        };

        let pid = child.id().map(|id| id as i32);
        let outcome = match self.predicate.timeout() {
            Some(duration) => match tokio::time::timeout(duration, supervise(&mut child, &mut watches)).await {
                Ok(result) => result?,
                Err(_) => {
                    if let Some(pid) = pid {
                        kill_process_group(pid)?;
                    }
                    let _ = child.wait().await;
                    log::debug!("candidate timed out after {:?}, classifying as PASS", duration);
                    SuperviseOutcome { status: None, fd_match: false }
                }
            },
            None => supervise(&mut child, &mut watches).await?,
        };

        candidate.release().ok();
        Ok(classify(&outcome, &self.predicate))
    }
}

struct SuperviseOutcome {
    status: Option<std::process::ExitStatus>,
    fd_match: bool,
}

/// The supervisor blocks in exactly one place at a time (spec.md §5): while
/// any watched fd is still open it waits only on those fds, matching on the
/// first substring hit or draining to EOF; once every fd has drained (or
/// there were none to watch) it waits on the single child reap. Waiting for
/// every fd to close before reaping means a match written just before exit
/// is never lost to a race against the exit event.
async fn supervise(
    child: &mut tokio::process::Child,
    watches: &mut [FdWatch],
) -> Result<SuperviseOutcome> {
    let mut live: Vec<&mut FdWatch> = watches.iter_mut().collect();

    while !live.is_empty() {
        let polls = live.iter_mut().map(|w| Box::pin(w.poll()));
        let (result, index, _) = select_all(polls).await;
        match result {
            Ok(FdOutcome::Matched) => {
                return Ok(SuperviseOutcome { status: None, fd_match: true });
            }
            Ok(FdOutcome::Eof) => {
                live.remove(index);
            }
            Err(e) => return Err(OracleError::Io(e)),
        }
    }

    let status = child.wait().await.map_err(OracleError::Io)?;
    Ok(SuperviseOutcome { status: Some(status), fd_match: false })
}

fn kill_process_group(pid: i32) -> Result<()> {
    kill(Pid::from_raw(-pid), Signal::SIGKILL).map_err(|source| OracleError::Kill { pgid: pid, source })
}

fn set_nonblocking(fd: RawFd) {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
    }
}

/// spec.md §4.5 step 8: FAIL iff the exit status matches the predicate's
/// status/signal sets, ORed with any substring match already observed.
/// Substring matches short-circuit supervision (no exit status is waited
/// for in that case) and are not double-counted against the status sets.
fn classify(outcome: &SuperviseOutcome, predicate: &FailurePredicate) -> bool {
    if outcome.fd_match {
        return true;
    }
    match outcome.status {
        Some(status) => {
            if let Some(code) = status.code() {
                predicate.is_failure_status(code as u8)
            } else if let Some(sig) = status.signal() {
                predicate.is_failure_signal(sig as u8)
            } else {
                false
            }
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddmin_chunkset::{Chunk, ChunkSet};
    use ddmin_failure_predicate::FailurePredicateBuilder;

    fn whole(bytes: &[u8]) -> ChunkSet {
        ChunkSet::whole(bytes.len()).unwrap()
    }

    #[tokio::test]
    async fn exit_status_match_is_fail() {
        let original = b"irrelevant".to_vec();
        let template = CommandTemplate::parse("sh -c 'exit 1' @", false).unwrap();
        let predicate = FailurePredicateBuilder::new().status("1").build().unwrap();
        let oracle = Oracle::new(original.clone(), template, predicate);
        let mut cache = Cache::new();

        let verdict = oracle.query(&whole(&original), &mut cache).await.unwrap();
        assert!(verdict);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn exit_zero_is_pass_under_default_predicate() {
        let original = b"irrelevant".to_vec();
        let template = CommandTemplate::parse("true @", false).unwrap();
        let predicate = FailurePredicateBuilder::new().build().unwrap();
        let oracle = Oracle::new(original.clone(), template, predicate);
        let mut cache = Cache::new();

        let verdict = oracle.query(&whole(&original), &mut cache).await.unwrap();
        assert!(!verdict);
    }

    #[tokio::test]
    async fn second_query_hits_cache() {
        let original = b"irrelevant".to_vec();
        let template = CommandTemplate::parse("true @", false).unwrap();
        let predicate = FailurePredicateBuilder::new().build().unwrap();
        let oracle = Oracle::new(original.clone(), template, predicate);
        let mut cache = Cache::new();

        oracle.query(&whole(&original), &mut cache).await.unwrap();
        oracle.query(&whole(&original), &mut cache).await.unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn watched_stdout_substring_is_fail() {
        let original = b"irrelevant".to_vec();
        let template = CommandTemplate::parse("sh -c 'echo boom' @", false).unwrap();
        let predicate = FailurePredicateBuilder::new().write(1, "boom").build().unwrap();
        let oracle = Oracle::new(original.clone(), template, predicate);
        let mut cache = Cache::new();

        let verdict = oracle.query(&whole(&original), &mut cache).await.unwrap();
        assert!(verdict);
    }

    #[tokio::test]
    async fn watched_stdout_without_substring_is_pass() {
        let original = b"irrelevant".to_vec();
        let template = CommandTemplate::parse("sh -c 'echo quiet' @", false).unwrap();
        let predicate = FailurePredicateBuilder::new().write(1, "boom").build().unwrap();
        let oracle = Oracle::new(original.clone(), template, predicate);
        let mut cache = Cache::new();

        let verdict = oracle.query(&whole(&original), &mut cache).await.unwrap();
        assert!(!verdict);
    }

    #[tokio::test]
    async fn timeout_classifies_as_pass() {
        let original = b"irrelevant".to_vec();
        let template = CommandTemplate::parse("sh -c 'sleep 5' @", false).unwrap();
        let predicate = FailurePredicateBuilder::new()
            .status("0-255")
            .timeout_ms(100)
            .build()
            .unwrap();
        let oracle = Oracle::new(original.clone(), template, predicate);
        let mut cache = Cache::new();

        let verdict = oracle.query(&whole(&original), &mut cache).await.unwrap();
        assert!(!verdict);
    }

    #[tokio::test]
    async fn nonexistent_program_classifies_as_pass() {
        let original = b"irrelevant".to_vec();
        let template = CommandTemplate::parse("/no/such/program @", false).unwrap();
        let predicate = FailurePredicateBuilder::new().build().unwrap();
        let oracle = Oracle::new(original.clone(), template, predicate);
        let mut cache = Cache::new();

        let verdict = oracle.query(&whole(&original), &mut cache).await.unwrap();
        assert!(!verdict);
    }

    #[tokio::test]
    async fn stdin_input_mode_feeds_candidate_bytes() {
        // grep exits 0 (a "pass" under the default nonzero-is-fail predicate)
        // only if "hello" is actually present on stdin, which only happens
        // if the candidate's bytes were correctly piped in.
        let original = b"hello".to_vec();
        let template = CommandTemplate::parse("grep hello <@", false).unwrap();
        let predicate = FailurePredicateBuilder::new().build().unwrap();
        let oracle = Oracle::new(original.clone(), template, predicate);
        let mut cache = Cache::new();

        let set = ChunkSet::new(vec![Chunk::new(0, 5).unwrap()], original.len()).unwrap();
        let verdict = oracle.query(&set, &mut cache).await.unwrap();
        assert!(!verdict);
    }
}
