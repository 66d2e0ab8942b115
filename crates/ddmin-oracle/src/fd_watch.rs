//! Per-fd rolling-buffer substring watch (spec.md §4.5 step 5-6).

use std::fs::File;
use std::io::{self, Read};
use std::os::unix::io::{FromRawFd, RawFd};
use tokio::io::unix::AsyncFd;

/// Outcome of one non-blocking read attempt on a watched fd.
pub enum FdOutcome {
    /// One of the fd's substrings was observed.
    Matched,
    /// The write end was closed; no more data will arrive.
    Eof,
}

/// Rolling-buffer substring matcher, split out from [`FdWatch`] so it can be
/// exercised without a real fd.
struct Matcher {
    patterns: Vec<Vec<u8>>,
    max_pattern_len: usize,
    /// Trailing bytes carried across reads, sized to `max_pattern_len - 1`
    /// (spec.md §4.5 step 5: "sized to hold the longest expected substring
    /// for that fd minus one byte of overlap").
    tail: Vec<u8>,
}

impl Matcher {
    fn new(patterns: Vec<Vec<u8>>) -> Self {
        let max_pattern_len = patterns.iter().map(Vec::len).max().unwrap_or(0);
        Self {
            patterns,
            max_pattern_len,
            tail: Vec::with_capacity(max_pattern_len.saturating_sub(1)),
        }
    }

    /// Append `data` and test every pattern against `tail ++ data`. Returns
    /// `true` on first match (spec.md §4.5 step 6: "Multiple matches are not
    /// double-counted: FAIL is boolean").
    fn observe(&mut self, data: &[u8]) -> bool {
        self.tail.extend_from_slice(data);
        let matched = self
            .patterns
            .iter()
            .any(|p| p.is_empty() || contains(&self.tail, p));

        let keep_from = self
            .tail
            .len()
            .saturating_sub(self.max_pattern_len.saturating_sub(1));
        if keep_from > 0 {
            self.tail.drain(..keep_from);
        }
        matched
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// One watched output fd: its non-blocking read end plus the substring
/// matcher for the patterns it watches.
pub struct FdWatch {
    fd: i32,
    async_fd: AsyncFd<File>,
    matcher: Matcher,
}

impl FdWatch {
    /// `read_fd` must already be non-blocking; ownership is taken (closed on
    /// drop via the wrapping `File`/`AsyncFd`).
    pub fn new(fd: i32, read_fd: RawFd, patterns: Vec<Vec<u8>>) -> io::Result<Self> {
        let file = unsafe { File::from_raw_fd(read_fd) };
        Ok(Self {
            fd,
            async_fd: AsyncFd::new(file)?,
            matcher: Matcher::new(patterns),
        })
    }

    pub fn fd(&self) -> i32 {
        self.fd
    }

    /// Wait for readability and read until either a pattern matches or EOF is
    /// seen, retrying transparently on a would-block wakeup (the standard
    /// `AsyncFd` recipe) — this absorbs the EINTR-equivalent retries spec.md
    /// §7 calls for.
    pub async fn poll(&mut self) -> io::Result<FdOutcome> {
        let mut buf = [0u8; 4096];
        loop {
            let mut guard = self.async_fd.readable_mut().await?;
            match guard.try_io(|inner| inner.get_mut().read(&mut buf)) {
                Ok(Ok(0)) => return Ok(FdOutcome::Eof),
                Ok(Ok(n)) => {
                    if self.matcher.observe(&buf[..n]) {
                        return Ok(FdOutcome::Matched);
                    }
                    continue;
                }
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
    }
}
