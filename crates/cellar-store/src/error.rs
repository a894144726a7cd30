use cellar_types::{Hash, RefStatus};

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(Hash),

    /// The encoding does not hash to the key it was stored under.
    #[error("hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch { expected: Hash, computed: Hash },

    /// Attempted to record a status the store does not track.
    #[error("status {0} cannot be stored")]
    UnstorableStatus(RefStatus),

    /// Attempted to write under the null hash.
    #[error("cannot store object under the null hash")]
    NullHash,

    /// Failure reported by the underlying backend.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
