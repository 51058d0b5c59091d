use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unexpected token {0:?}")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEof,
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("wrong number of arguments for '{0}': expected {1}, got {2}")]
    ArityMismatch(String, usize, usize),
    #[error("evaluation error: {0}")]
    Evaluation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
