//! Compiles the immutable [`FailurePredicate`] tuple of spec.md §3/§4.4: a
//! status-code set, a termination-signal set, a list of watched-fd
//! substrings, and a timeout, ORed together.

pub mod error;
pub mod signal_names;

pub use error::{PredicateError, Result};

use getset::Getters;
use std::collections::BTreeSet;

/// The compiled, immutable failure condition. Construct via
/// [`FailurePredicateBuilder`]; `FailurePredicate` itself has no public
/// constructor because the construction rules (defaulting, shell-mode
/// folding) must run exactly once, in order.
#[derive(Clone, Debug, Getters)]
pub struct FailurePredicate {
    #[get = "pub"]
    status: BTreeSet<u8>,
    #[get = "pub"]
    signal: BTreeSet<u8>,
    #[get = "pub"]
    writes: Vec<(i32, String)>,
    #[get = "pub"]
    timeout_ms: u64,
    /// Hook for a future program-counter match clause (spec.md §9:
    /// "Debugger/PC-filtering ... not implemented ... leave a hook").
    #[get = "pub"]
    pc_filter: Option<String>,
}

impl FailurePredicate {
    pub fn is_failure_status(&self, code: u8) -> bool {
        self.status.contains(&code)
    }

    pub fn is_failure_signal(&self, sig: u8) -> bool {
        self.signal.contains(&sig)
    }

    pub fn timeout(&self) -> Option<std::time::Duration> {
        if self.timeout_ms == 0 {
            None
        } else {
            Some(std::time::Duration::from_millis(self.timeout_ms))
        }
    }
}

/// Accumulates raw CLI tokens (repeatable flags) and compiles them into a
/// [`FailurePredicate`] per the rules of spec.md §4.4.
#[derive(Default)]
pub struct FailurePredicateBuilder {
    status_tokens: Vec<String>,
    signal_tokens: Vec<String>,
    writes: Vec<(i32, String)>,
    shell: bool,
    timeout_ms: Option<u64>,
}

impl FailurePredicateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one `--status` occurrence's raw value (itself a comma list).
    pub fn status(mut self, raw: impl Into<String>) -> Self {
        self.status_tokens.push(raw.into());
        self
    }

    /// Add one `--signal` occurrence's raw value (itself a comma list).
    pub fn signal(mut self, raw: impl Into<String>) -> Self {
        self.signal_tokens.push(raw.into());
        self
    }

    /// `--segfaults` is sugar for `--signal SIGSEGV`.
    pub fn segfaults(self) -> Self {
        self.signal("SIGSEGV")
    }

    pub fn write(mut self, fd: i32, substring: impl Into<String>) -> Self {
        self.writes.push((fd, substring.into()));
        self
    }

    pub fn shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn build(self) -> Result<FailurePredicate> {
        let mut status = parse_list(&self.status_tokens, 0, 255, parse_status_atom)?;
        let mut signal = parse_list(&self.signal_tokens, 1, 64, parse_signal_atom)?;

        if self.shell {
            for s in signal.iter() {
                status.insert(s | 0x80);
            }
            signal.clear();
        }

        if status.is_empty() && signal.is_empty() && self.writes.is_empty() {
            status = (1..=255u16).map(|n| n as u8).collect();
        }

        Ok(FailurePredicate {
            status,
            signal,
            writes: self.writes,
            timeout_ms: self.timeout_ms.unwrap_or(1000),
            pc_filter: None,
        })
    }
}

/// Parse all comma-separated tokens across every occurrence of a repeatable
/// flag into `S+ \ S-`, applying the "`S+` empty, `S-` non-empty => `S+ :=
/// full range" convention first.
fn parse_list(
    tokens: &[String],
    min: u8,
    max: u8,
    parse_atom: impl Fn(&str, u8, u8) -> Result<Vec<u8>>,
) -> Result<BTreeSet<u8>> {
    let mut positive: BTreeSet<u8> = BTreeSet::new();
    let mut negative: BTreeSet<u8> = BTreeSet::new();

    for token in tokens {
        for part in token.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (negated, rest) = match part.strip_prefix('~') {
                Some(r) => (true, r),
                None => (false, part),
            };
            let values = parse_atom(rest, min, max)?;
            let target = if negated { &mut negative } else { &mut positive };
            target.extend(values);
        }
    }

    if positive.is_empty() && !negative.is_empty() {
        positive = (min..=max).collect();
    }

    Ok(positive.difference(&negative).copied().collect())
}

fn parse_range(rest: &str, min: u8, max: u8) -> Result<Vec<u8>> {
    if let Some((lo, hi)) = rest.split_once('-') {
        let lo = parse_bounded(lo, min, max)?;
        let hi = parse_bounded(hi, min, max)?;
        if hi < lo {
            // Ranges with H<L are empty, not errors (spec.md §4.4).
            return Ok(Vec::new());
        }
        Ok((lo..=hi).collect())
    } else {
        Ok(vec![parse_bounded(rest, min, max)?])
    }
}

fn parse_bounded(s: &str, min: u8, max: u8) -> Result<u8> {
    let n: i64 = s
        .trim()
        .parse()
        .map_err(|_| PredicateError::InvalidToken(s.to_string()))?;
    if n < min as i64 || n > max as i64 {
        return Err(PredicateError::OutOfRange {
            value: n,
            min: min as i64,
            max: max as i64,
        });
    }
    Ok(n as u8)
}

fn parse_status_atom(rest: &str, min: u8, max: u8) -> Result<Vec<u8>> {
    parse_range(rest, min, max)
}

fn parse_signal_atom(rest: &str, min: u8, max: u8) -> Result<Vec<u8>> {
    if rest.eq_ignore_ascii_case("ANY") {
        return Ok((min..=max).collect());
    }
    if rest.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return parse_range(rest, min, max);
    }
    let n = signal_names::lookup(rest).ok_or_else(|| PredicateError::UnknownSignalName(rest.to_string()))?;
    if n < min || n > max {
        return Err(PredicateError::OutOfRange {
            value: n as i64,
            min: min as i64,
            max: max as i64,
        });
    }
    Ok(vec![n])
}
