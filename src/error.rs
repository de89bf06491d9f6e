//! Error taxonomy shared by the raw reader and the Xdawn engine.
//!
//! Every error is raised at the point of detection and never retried.
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid shapes, parameters or parameter combinations.
    #[error("configuration error: {0}")]
    Config(String),

    /// The backing file returned fewer bytes than the chunk required.
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    /// Operation intentionally not provided by this type.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Numerical failure inside a decomposition.
    #[error("linear algebra failure: {0}")]
    Linalg(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed safetensors header.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_read_message_carries_counts() {
        let e = Error::ShortRead { expected: 400, got: 12 };
        assert_eq!(e.to_string(), "short read: expected 400 bytes, got 12");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: Error = io.into();
        assert!(matches!(e, Error::Io(_)));
    }
}
