use bytes::Bytes;
use cellar_types::{Hash, RefStatus};

use crate::error::StoreResult;
use crate::object::StoredObject;

/// Hash-keyed encoding store.
///
/// All implementations must satisfy these invariants:
/// - An encoding is immutable once written. Writing the same hash again only
///   ever raises the recorded status.
/// - Only `Stored`, `Persisted`, `Verified` and `Announced` are recorded.
/// - Concurrent reads are always safe.
/// - All backend errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read an object by hash.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    fn read(&self, hash: &Hash) -> StoreResult<Option<StoredObject>>;

    /// Write `encoding` under `hash` with at least `status`.
    ///
    /// Returns `true` if the object was new or its status was raised, and
    /// `false` if the store already held it at `status` or higher.
    fn write(&self, hash: &Hash, encoding: &Bytes, status: RefStatus) -> StoreResult<bool>;

    /// Check whether an object exists in the store.
    fn exists(&self, hash: &Hash) -> StoreResult<bool>;

    /// Delete an object by hash. Returns `true` if the object existed.
    ///
    /// Deleting an object still referenced by others leaves dangling hashes
    /// that surface later as missing data.
    fn delete(&self, hash: &Hash) -> StoreResult<bool>;

    /// Recorded status of an object, if present.
    fn status(&self, hash: &Hash) -> StoreResult<Option<RefStatus>> {
        Ok(self.read(hash)?.map(|obj| obj.status))
    }
}
