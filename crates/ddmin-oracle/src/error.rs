use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OracleError>;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("materialize candidate: {0}")]
    Materialize(#[from] ddmin_materializer::MaterializeError),

    #[error("expand command template: {0}")]
    Template(#[from] ddmin_command_template::TemplateError),

    #[error("spawn subject: {0}")]
    Spawn(#[source] io::Error),

    #[error("create pipe for watched fd {fd}: {source}")]
    Pipe {
        fd: i32,
        #[source]
        source: nix::Error,
    },

    #[error("supervise subject: {0}")]
    Io(#[from] io::Error),

    #[error("kill process group {pgid}: {source}")]
    Kill {
        pgid: i32,
        #[source]
        source: nix::Error,
    },
}
