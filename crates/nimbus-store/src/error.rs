//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The named bucket does not exist.
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// The named object does not exist or has no current version.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// No chunk is stored under the given digest.
    #[error("chunk not found: {0}")]
    ChunkNotFound(String),

    /// A bucket with the given name already exists.
    #[error("bucket already exists: {0}")]
    BucketAlreadyExists(String),

    /// The catalog engine failed a transaction.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// A stored record could not be encoded or decoded.
    #[error("corrupt record: {0}")]
    Corruption(String),

    /// A writer or reader was used after it was closed.
    #[error("already closed")]
    Closed,
}

/// Coarse classification of a [`StorageError`].
///
/// The protocol layer above the engine maps these onto wire-level statuses;
/// every failure the engine returns falls into exactly one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A bucket, object, or chunk was absent.
    NotFound,
    /// A bucket name was already taken.
    AlreadyExists,
    /// An I/O, transaction, or record-decoding failure. Propagated verbatim
    /// and never retried inside the engine; retry is the caller's decision.
    Transient,
    /// A handle was used after it was closed.
    Misuse,
}

impl StorageError {
    /// Classifies this error for the boundary with the protocol layer.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BucketNotFound(_) | Self::ObjectNotFound(_) | Self::ChunkNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::BucketAlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::Io(_) | Self::Catalog(_) | Self::Corruption(_) => ErrorKind::Transient,
            Self::Closed => ErrorKind::Misuse,
        }
    }
}
