use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use cellar_crypto::digest;
use cellar_types::{Hash, RefStatus};
use tracing::warn;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::traits::ObjectStore;

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. All objects are held in memory behind a
/// `RwLock` for safe concurrent access. Encodings are `Bytes`, so reads
/// share storage instead of copying.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<Hash, StoredObject>>,
    config: StoreConfig,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create a new empty in-memory store.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn read(&self, hash: &Hash) -> StoreResult<Option<StoredObject>> {
        let found = self.objects.read().expect("lock poisoned").get(hash).cloned();
        if let Some(obj) = &found {
            if self.config.verify_on_read {
                if let Err(e) = obj.verify(hash) {
                    warn!(hash = %hash.short_hex(), error = %e, "stored encoding failed verification");
                    return Err(e);
                }
            }
        }
        Ok(found)
    }

    fn write(&self, hash: &Hash, encoding: &Bytes, status: RefStatus) -> StoreResult<bool> {
        if hash.is_null() {
            return Err(StoreError::NullHash);
        }
        if !status.is_storable() {
            return Err(StoreError::UnstorableStatus(status));
        }
        if self.config.verify_on_write {
            let computed = digest(encoding);
            if &computed != hash {
                warn!(
                    expected = %hash.short_hex(),
                    computed = %computed.short_hex(),
                    "rejected write with mismatched hash"
                );
                return Err(StoreError::HashMismatch {
                    expected: *hash,
                    computed,
                });
            }
        }

        let mut map = self.objects.write().expect("lock poisoned");
        match map.get_mut(hash) {
            Some(existing) if existing.status >= status => Ok(false),
            Some(existing) => {
                existing.status = status;
                Ok(true)
            }
            None => {
                map.insert(*hash, StoredObject::new(encoding.clone(), status));
                Ok(true)
            }
        }
    }

    fn exists(&self, hash: &Hash) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(hash))
    }

    fn delete(&self, hash: &Hash) -> StoreResult<bool> {
        let mut map = self.objects.write().expect("lock poisoned");
        Ok(map.remove(hash).is_some())
    }

    fn status(&self, hash: &Hash) -> StoreResult<Option<RefStatus>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(hash).map(|obj| obj.status))
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &count)
            .field("config", &self.config)
            .finish()
    }
}
