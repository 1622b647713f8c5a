//! Client error types.

use metacat_proto::error_codes;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] metacat_proto::Error),

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// The request was rejected before it was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The server answered with an error status.
    #[error("server error {code}: {message}")]
    Server {
        /// One of [`error_codes`].
        code: u32,
        /// Server-side description.
        message: String,
    },
}

impl Error {
    /// The server error code, if the server answered with one.
    pub fn code(&self) -> Option<u32> {
        match self {
            Error::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// A strict write addressed a missing object.
    pub fn is_not_found(&self) -> bool {
        self.code() == Some(error_codes::NOT_FOUND)
    }

    /// The object or constraint name is taken.
    pub fn is_already_exists(&self) -> bool {
        self.code() == Some(error_codes::ALREADY_EXISTS)
    }

    /// The write referenced a missing or malformed schema object.
    pub fn is_invalid_object(&self) -> bool {
        self.code() == Some(error_codes::INVALID_OBJECT)
    }

    /// The operation is not allowed on the object's current state.
    pub fn is_invalid_operation(&self) -> bool {
        self.code() == Some(error_codes::INVALID_OPERATION)
    }

    /// Whether retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout) || self.code() == Some(error_codes::STORE_UNAVAILABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_helpers() {
        let err = Error::Server {
            code: error_codes::ALREADY_EXISTS,
            message: "Constraint name already exists: t_uk".to_string(),
        };
        assert!(err.is_already_exists());
        assert!(!err.is_not_found());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("t_uk"));
    }

    #[test]
    fn test_retryable() {
        assert!(Error::Timeout.is_retryable());
        let err = Error::Server {
            code: error_codes::STORE_UNAVAILABLE,
            message: "io".to_string(),
        };
        assert!(err.is_retryable());
        assert_eq!(Error::Connection("x".into()).code(), None);
    }
}
