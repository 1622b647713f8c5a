//! Core error types.

use thiserror::Error;

/// Core catalog errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] metacat_proto::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A strict write addressed an object that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write references a missing or malformed schema object.
    #[error("invalid object: {0}")]
    InvalidSchemaObject(String),

    /// The object or constraint name is taken.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The operation is not allowed on the object's current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A concurrent write changed the state the operation was prepared against.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl Error {
    /// Check whether the store could not complete the operation, as opposed
    /// to rejecting it. Retrying the whole operation may succeed.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Conflict(_))
    }
}
