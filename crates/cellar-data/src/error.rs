use cellar_format::DecodeError;
use cellar_store::StoreError;
use cellar_types::{Hash, RefStatus};

use crate::cell::CellType;

/// Errors from cell, reference and collection operations.
#[derive(Debug, thiserror::Error)]
pub enum CellError {
    /// A referenced value is neither in memory nor in any reachable store.
    #[error("missing data for {0}")]
    MissingData(Hash),

    /// An encoding could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Attempted to lower a status that can no longer be lowered.
    #[error("cannot lower status from {from} to {to}")]
    StatusDowngrade { from: RefStatus, to: RefStatus },

    /// A structural invariant does not hold.
    #[error("invalid cell: {0}")]
    Invalid(String),

    /// A symbol or keyword name is empty, too long or not UTF-8.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// A cell has a different shape than the operation requires.
    #[error("expected {expected}, found {actual}")]
    WrongType {
        expected: &'static str,
        actual: CellType,
    },
}

impl CellError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }
}

/// Result alias for cell operations.
pub type CellResult<T> = Result<T, CellError>;
