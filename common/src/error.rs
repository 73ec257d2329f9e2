use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("invalid configuration at entry {index}: {reason}")]
    InvalidConfiguration { index: usize, reason: &'static str },
    #[error("too many breakpoints ({len}, at most {max} allowed)")]
    TooManyEntries { len: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("stored value is empty")]
    Empty,
    #[error("expected a single byte, found {0}")]
    TrailingBytes(usize),
    #[error("stored value {0} is out of range")]
    OutOfRange(u8),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("storage is not available")]
    Unavailable,
    #[error("storage task did not complete: {0}")]
    Interrupted(String),
    #[error("failed to write {path}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
