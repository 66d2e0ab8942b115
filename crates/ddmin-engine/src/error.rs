use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("initial test case does not reproduce the failure")]
    InitialTestDoesNotFail,

    #[error(transparent)]
    Oracle(#[from] ddmin_oracle::OracleError),

    #[error(transparent)]
    Chunkset(#[from] ddmin_chunkset::ChunksetError),
}
