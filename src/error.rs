//! Top-level CLI error type. Every library-crate error is folded in here via
//! `#[from]`; [`CliError::is_config_error`] drives the red-highlighted
//! stderr reporting spec.md §7 calls for on configuration errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("stdin is not seekable; pass -i/--input to read from a file instead")]
    UnseekableInput,

    #[error("--write-to-stdin is not supported together with --shell")]
    StdinWithShell,

    #[error("invalid --writes-to value {0:?}: expected \"FD STR\"")]
    InvalidWritesTo(String),

    #[error("input is empty; nothing to minimize")]
    EmptyInput,

    #[error("command template: {0}")]
    Template(#[from] ddmin_command_template::TemplateError),

    #[error("failure predicate: {0}")]
    Predicate(#[from] ddmin_failure_predicate::PredicateError),

    #[error("chunk set: {0}")]
    Chunkset(#[from] ddmin_chunkset::ChunksetError),

    #[error(transparent)]
    Engine(#[from] ddmin_engine::EngineError),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Configuration errors (bad flags, unparsable predicates, unseekable
    /// stdin, conflicting modes) are reported in red before any child is
    /// spawned; everything else (initial-does-not-fail, transient child/
    /// kernel errors surfaced during the run) is reported plainly.
    pub fn is_config_error(&self) -> bool {
        !matches!(
            self,
            CliError::Engine(ddmin_engine::EngineError::InitialTestDoesNotFail)
                | CliError::Engine(ddmin_engine::EngineError::Oracle(_))
                | CliError::Io(_)
        )
    }
}
