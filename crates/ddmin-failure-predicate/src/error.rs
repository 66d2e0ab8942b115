use thiserror::Error;

pub type Result<T> = std::result::Result<T, PredicateError>;

#[derive(Error, Debug)]
pub enum PredicateError {
    #[error("invalid status/signal token {0:?}")]
    InvalidToken(String),

    #[error("value {value} out of range [{min}, {max}]")]
    OutOfRange { value: i64, min: i64, max: i64 },

    #[error("unknown signal name {0:?}")]
    UnknownSignalName(String),
}
