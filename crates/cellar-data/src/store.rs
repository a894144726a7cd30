//! Cell stores: persistence of cells through an [`ObjectStore`].

use std::sync::{Arc, Weak};

use bytes::Bytes;
use cellar_store::{InMemoryObjectStore, ObjectStore, StoreConfig};
use cellar_types::{Hash, RefStatus};
use tracing::debug;

use crate::cell::Cell;
use crate::error::{CellError, CellResult};
use crate::refs::Ref;

/// Interface between cells and a persistent store.
///
/// `on_novelty` is invoked exactly once for every value whose stored status
/// was newly raised by the call, children before parents.
pub trait CellStore: Send + Sync {
    /// Find a stored value by hash.
    fn lookup(&self, hash: &Hash) -> CellResult<Option<Ref>>;

    /// Store the value's own encoding; children are not visited.
    fn store_shallow(&self, r: &Ref, on_novelty: &mut dyn FnMut(&Ref)) -> CellResult<Ref>;

    /// Store the value and every descendant.
    fn persist(&self, r: &Ref, on_novelty: &mut dyn FnMut(&Ref)) -> CellResult<Ref>;

    /// Store the value and every descendant, marking all of them announced.
    fn announce(&self, r: &Ref, on_novelty: &mut dyn FnMut(&Ref)) -> CellResult<Ref>;
}

/// A [`CellStore`] over any [`ObjectStore`].
///
/// Always handled through an `Arc`: soft references handed out by the store
/// keep it alive.
pub struct ObjectCellStore<S> {
    objects: S,
    me: Weak<ObjectCellStore<S>>,
}

/// Cell store backed by memory.
pub type MemoryStore = ObjectCellStore<InMemoryObjectStore>;

impl MemoryStore {
    /// A fresh in-memory store with the default configuration.
    pub fn in_memory() -> Arc<Self> {
        Self::new(InMemoryObjectStore::new())
    }

    /// A fresh in-memory store.
    pub fn in_memory_with(config: StoreConfig) -> Arc<Self> {
        Self::new(InMemoryObjectStore::with_config(config))
    }
}

impl<S: ObjectStore + 'static> ObjectCellStore<S> {
    pub fn new(objects: S) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            objects,
            me: me.clone(),
        })
    }

    /// The underlying object store.
    pub fn objects(&self) -> &S {
        &self.objects
    }

    fn handle(&self) -> Option<Arc<dyn CellStore>> {
        self.me.upgrade().map(|me| me as Arc<dyn CellStore>)
    }

    /// Decode an encoding whose hash-pointer children resolve through this
    /// store.
    pub fn decode(&self, encoding: Bytes) -> CellResult<Cell> {
        crate::decode::decode_cell(encoding, self.handle().as_ref())
    }

    /// Persist a cell and return a reference to the stored version.
    pub fn persist_cell(&self, cell: &Cell) -> CellResult<Ref> {
        self.persist(&cell.to_ref(), &mut |_| {})
    }

    fn walk(
        &self,
        r: &Ref,
        target: RefStatus,
        deep: bool,
        on_novelty: &mut dyn FnMut(&Ref),
    ) -> CellResult<Ref> {
        if r.is_embedded() {
            // Embedded values are never written, but may point at values
            // that are.
            if !deep {
                return Ok(r.clone());
            }
            let cell = r.value()?;
            let updated = self.walk_children(&cell, target, on_novelty)?;
            return Ok(if updated.ptr_eq(&cell) {
                r.clone()
            } else {
                Ref::direct(updated)
            });
        }

        let status = r.status();
        if status == RefStatus::Invalid {
            return Err(CellError::invalid(format!(
                "cannot store invalidated ref {}",
                r.hash()
            )));
        }
        if status >= target {
            return Ok(r.clone());
        }

        let hash = r.hash();
        if let Some(stored) = self.objects.status(&hash)? {
            if stored >= target {
                r.set_status(stored)?;
                return Ok(r.clone());
            }
        }

        let mut cell = r.value()?;
        if deep {
            cell = self.walk_children(&cell, target, on_novelty)?;
        }

        let novel = self.objects.write(&hash, &cell.encoding(), target)?;
        r.set_status(target)?;
        let result = Ref::direct_with_status(cell, target);
        if novel {
            debug!(hash = %hash.short_hex(), status = %target, "novel cell");
            on_novelty(&result);
        }
        Ok(result)
    }

    /// Walk every child of `cell`; stored children come back as soft refs
    /// so the caller's tree can be released.
    fn walk_children(
        &self,
        cell: &Cell,
        target: RefStatus,
        on_novelty: &mut dyn FnMut(&Ref),
    ) -> CellResult<Cell> {
        let handle = self.handle();
        cell.try_update_refs(|child| {
            let done = self.walk(child, target, true, &mut *on_novelty)?;
            Ok::<_, CellError>(match &handle {
                Some(store) => done.to_soft(store),
                None => done,
            })
        })
    }
}

impl<S: ObjectStore + 'static> CellStore for ObjectCellStore<S> {
    fn lookup(&self, hash: &Hash) -> CellResult<Option<Ref>> {
        let Some(stored) = self.objects.read(hash)? else {
            return Ok(None);
        };
        let cell = self.decode(stored.encoding)?;
        Ok(Some(Ref::direct_with_status(cell, stored.status)))
    }

    fn store_shallow(&self, r: &Ref, on_novelty: &mut dyn FnMut(&Ref)) -> CellResult<Ref> {
        self.walk(r, RefStatus::Stored, false, on_novelty)
    }

    fn persist(&self, r: &Ref, on_novelty: &mut dyn FnMut(&Ref)) -> CellResult<Ref> {
        self.walk(r, RefStatus::Persisted, true, on_novelty)
    }

    fn announce(&self, r: &Ref, on_novelty: &mut dyn FnMut(&Ref)) -> CellResult<Ref> {
        self.walk(r, RefStatus::Announced, true, on_novelty)
    }
}

impl<S: ObjectStore> std::fmt::Debug for ObjectCellStore<S>
where
    S: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCellStore")
            .field("objects", &self.objects)
            .finish()
    }
}
