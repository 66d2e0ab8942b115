//! Command-line surface (spec.md §6), parsed with `clap`'s derive API.

use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

/// Delta-debugging minimizer for failing test cases.
#[derive(Parser, Debug)]
#[command(name = "ddmin", about, version, after_help = "More info: https://github.com/cri-o/containrs")]
pub struct Cli {
    /// Command template to run against each candidate (see the grammar in
    /// the crate docs for `@`, `@@` and `<@`).
    pub command: String,

    /// Source file (default: stdin, which must be seekable).
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Destination (default: stdout).
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Increase logging verbosity; repeatable up to three times.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Status-code failure predicate, e.g. "1-10,~5" (repeatable).
    #[arg(long = "status", value_name = "LIST")]
    pub status: Vec<String>,

    /// Signal failure predicate, e.g. "SIGSEGV,ANY" (repeatable).
    #[arg(long = "signal", value_name = "LIST")]
    pub signal: Vec<String>,

    /// Shorthand for `--signal SIGSEGV`.
    #[arg(long)]
    pub segfaults: bool,

    /// Watch an fd for a substring: `--writes-to 2 panic` (repeatable).
    #[arg(long = "writes-to", num_args = 2, value_names = ["FD", "STR"])]
    pub writes_to: Vec<String>,

    /// Shorthand for `--writes-to 1 STR`.
    #[arg(long, value_name = "STR")]
    pub writes: Option<String>,

    /// Shorthand for `--writes-to 2 STR`.
    #[arg(long = "writes-to-stderr", value_name = "STR")]
    pub writes_to_stderr: Option<String>,

    /// Feed the candidate's bytes on the child's stdin.
    #[arg(long = "write-to-stdin")]
    pub write_to_stdin: bool,

    /// Per-candidate timeout in milliseconds; 0 disables it (default 1000).
    #[arg(short = 't', long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Wrap the command in `sh -c` instead of splitting it on whitespace.
    #[arg(long)]
    pub shell: bool,
}

impl Cli {
    /// Maps the `-v` occurrence count to a `log::LevelFilter`: 0 is silent,
    /// each additional occurrence widens the ladder by one step.
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose.min(3) {
            0 => LevelFilter::Off,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_ladder() {
        let mut cli = Cli::parse_from(["ddmin", "cmd"]);
        assert_eq!(cli.log_level(), LevelFilter::Off);
        cli.verbose = 1;
        assert_eq!(cli.log_level(), LevelFilter::Info);
        cli.verbose = 2;
        assert_eq!(cli.log_level(), LevelFilter::Debug);
        cli.verbose = 3;
        assert_eq!(cli.log_level(), LevelFilter::Trace);
        cli.verbose = 200;
        assert_eq!(cli.log_level(), LevelFilter::Trace);
    }

    #[test]
    fn writes_to_collects_pairs() {
        let cli = Cli::parse_from(["ddmin", "--writes-to", "2", "panic", "cmd"]);
        assert_eq!(cli.writes_to, vec!["2".to_string(), "panic".to_string()]);
    }

    #[test]
    fn positional_command_required() {
        let result = Cli::try_parse_from(["ddmin"]);
        assert!(result.is_err());
    }
}
