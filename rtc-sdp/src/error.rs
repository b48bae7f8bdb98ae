use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("empty input")]
    EmptyInput,

    #[error("missing mandatory line {0}")]
    MissingLine(&'static str),

    #[error("lines out of order at {0}")]
    OutOfOrder(&'static str),

    #[error("malformed line: {0}")]
    MalformedLine(String),

    #[error("invalid {0}: {1}")]
    InvalidField(&'static str, String),
}

pub type Result<T> = std::result::Result<T, Error>;
