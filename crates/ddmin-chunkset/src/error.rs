use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChunksetError>;

#[derive(Error, Debug)]
pub enum ChunksetError {
    #[error("chunk [{start}, {end}) is empty or inverted")]
    EmptyChunk { start: usize, end: usize },

    #[error("chunk [{start}, {end}) exceeds input length {len}")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error("chunks [{prev_end}) and [{start}) overlap or are out of order")]
    NotDisjoint { prev_end: usize, start: usize },

    #[error("index {index} out of range for chunk set of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}
