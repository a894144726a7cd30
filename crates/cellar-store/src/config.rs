use serde::{Deserialize, Serialize};

/// Behaviour switches for an object store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Recompute and check the hash of every encoding before writing it.
    pub verify_on_write: bool,
    /// Recompute and check the hash of every encoding returned by a read.
    pub verify_on_read: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            verify_on_write: true,
            verify_on_read: false,
        }
    }
}

impl StoreConfig {
    /// Trust callers completely; useful for benchmarks.
    pub fn unchecked() -> Self {
        Self {
            verify_on_write: false,
            verify_on_read: false,
        }
    }

    /// Check hashes in both directions.
    pub fn paranoid() -> Self {
        Self {
            verify_on_write: true,
            verify_on_read: true,
        }
    }
}
