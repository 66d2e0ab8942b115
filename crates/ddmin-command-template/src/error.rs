use thiserror::Error;

pub type Result<T> = std::result::Result<T, TemplateError>;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("unterminated quoted string in command template")]
    UnterminatedQuote,

    #[error("command template expands to an empty argument vector")]
    EmptyTemplate,

    #[error("candidate contents contain a NUL byte, which cannot be embedded in a shell command")]
    NulByteInContents,
}
