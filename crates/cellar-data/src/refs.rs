use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock, Weak};

use cellar_types::{Hash, RefStatus};
use tracing::{debug, trace};

use crate::cell::{Cell, CellData};
use crate::error::{CellError, CellResult};
use crate::store::CellStore;

/// A reference to a cell value.
///
/// A *direct* reference holds its value strongly. A *soft* reference holds
/// only a weak handle plus the hash; once the last strong [`Cell`] handle is
/// dropped the value is re-fetched from the store on demand.
///
/// Clones share the same status: raising the status through one clone is
/// visible through all of them.
#[derive(Clone)]
pub struct Ref(Arc<RefInner>);

struct RefInner {
    status: AtomicU8,
    target: Target,
}

enum Target {
    Direct(Cell),
    Soft {
        hash: Hash,
        cached: RwLock<Weak<CellData>>,
        store: Option<Arc<dyn CellStore>>,
    },
}

impl Ref {
    /// A reference that holds `cell` strongly.
    pub fn direct(cell: Cell) -> Self {
        Self::direct_with_status(cell, RefStatus::Unknown)
    }

    pub(crate) fn direct_with_status(cell: Cell, status: RefStatus) -> Self {
        Self(Arc::new(RefInner {
            status: AtomicU8::new(status.as_u8()),
            target: Target::Direct(cell),
        }))
    }

    /// A reference known only by hash, resolved through `store` on demand.
    pub fn soft(hash: Hash, store: Option<Arc<dyn CellStore>>) -> Self {
        Self::soft_with(hash, Weak::new(), store, RefStatus::Unknown)
    }

    fn soft_with(
        hash: Hash,
        cached: Weak<CellData>,
        store: Option<Arc<dyn CellStore>>,
        status: RefStatus,
    ) -> Self {
        Self(Arc::new(RefInner {
            status: AtomicU8::new(status.as_u8()),
            target: Target::Soft {
                hash,
                cached: RwLock::new(cached),
                store,
            },
        }))
    }

    /// A soft reference to the same value, backed by `store`.
    ///
    /// Embedded values never become soft; they are returned unchanged.
    pub fn to_soft(&self, store: &Arc<dyn CellStore>) -> Ref {
        if self.is_embedded() {
            return self.clone();
        }
        let cached = match &self.0.target {
            Target::Direct(cell) => cell.downgrade(),
            Target::Soft { cached, .. } => cached.read().expect("lock poisoned").clone(),
        };
        Self::soft_with(self.hash(), cached, Some(Arc::clone(store)), self.status())
    }

    /// Resolve the referenced value, fetching it from the store if needed.
    pub fn value(&self) -> CellResult<Cell> {
        match &self.0.target {
            Target::Direct(cell) => Ok(cell.clone()),
            Target::Soft {
                hash,
                cached,
                store,
            } => {
                if let Some(cell) = Cell::upgrade(&cached.read().expect("lock poisoned")) {
                    return Ok(cell);
                }
                let Some(store) = store else {
                    debug!(hash = %hash.short_hex(), "missing data: soft ref without store");
                    return Err(CellError::MissingData(*hash));
                };
                match store.lookup(hash)? {
                    Some(found) => {
                        let cell = found.value()?;
                        trace!(hash = %hash.short_hex(), "refetched soft ref from store");
                        *cached.write().expect("lock poisoned") = cell.downgrade();
                        self.raise(found.status());
                        Ok(cell)
                    }
                    None => {
                        debug!(hash = %hash.short_hex(), "missing data: not in store");
                        Err(CellError::MissingData(*hash))
                    }
                }
            }
        }
    }

    /// The referenced value if it is held in memory, without touching any
    /// store.
    pub fn try_value(&self) -> Option<Cell> {
        match &self.0.target {
            Target::Direct(cell) => Some(cell.clone()),
            Target::Soft { cached, .. } => Cell::upgrade(&cached.read().expect("lock poisoned")),
        }
    }

    /// Hash of the referenced value.
    pub fn hash(&self) -> Hash {
        match &self.0.target {
            Target::Direct(cell) => cell.hash(),
            Target::Soft { hash, .. } => *hash,
        }
    }

    /// Returns `true` if the value is written inline into its parent.
    pub fn is_embedded(&self) -> bool {
        match &self.0.target {
            Target::Direct(cell) => cell.is_embedded(),
            Target::Soft { .. } => false,
        }
    }

    /// Returns `true` if the value is held strongly.
    pub fn is_direct(&self) -> bool {
        matches!(self.0.target, Target::Direct(_))
    }

    /// Current status.
    pub fn status(&self) -> RefStatus {
        if self.is_embedded() {
            return RefStatus::Embedded;
        }
        RefStatus::from_u8(self.0.status.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Raise the status to at least `status`.
    ///
    /// Requests below the current status are ignored, except that a status
    /// at or above `Verified` (including `Invalid`) can never be lowered.
    /// Embedded references already satisfy every status.
    ///
    /// # Panics
    ///
    /// Panics if `status` is `Embedded`; embedding follows from the encoding
    /// length and cannot be assigned.
    pub fn set_status(&self, status: RefStatus) -> CellResult<()> {
        assert!(
            status != RefStatus::Embedded,
            "embedding cannot be assigned as a status"
        );
        if self.is_embedded() {
            return Ok(());
        }
        let current = self.status();
        if status < current {
            if current.is_locked() {
                return Err(CellError::StatusDowngrade {
                    from: current,
                    to: status,
                });
            }
            return Ok(());
        }
        self.raise(status);
        Ok(())
    }

    /// Mark this reference (and all its clones) invalid.
    pub fn invalidate(&self) {
        if !self.is_embedded() {
            self.0
                .status
                .store(RefStatus::Invalid.as_u8(), Ordering::Release);
        }
    }

    fn raise(&self, status: RefStatus) {
        self.0.status.fetch_max(status.as_u8(), Ordering::AcqRel);
    }

    /// Returns `true` if both handles share the same allocation.
    pub fn ptr_eq(&self, other: &Ref) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Cell> for Ref {
    fn from(cell: Cell) -> Self {
        Ref::direct(cell)
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.hash() == other.hash()
    }
}

impl Eq for Ref {}

impl std::hash::Hash for Ref {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Ref::hash(self).hash(state);
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_direct() { "direct" } else { "soft" };
        write!(
            f,
            "Ref({kind} {} {})",
            self.hash().short_hex(),
            self.status()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::Blob;

    fn big_cell() -> Cell {
        Blob::from(vec![7u8; 500]).into_cell()
    }

    #[test]
    fn direct_ref_of_small_value_is_embedded() {
        let r = Cell::integer(5).to_ref();
        assert!(r.is_embedded());
        assert_eq!(r.status(), RefStatus::Embedded);
        assert!(r.set_status(RefStatus::Stored).is_ok());
        assert_eq!(r.status(), RefStatus::Embedded);
    }

    #[test]
    fn status_only_rises() {
        let r = big_cell().to_ref();
        assert_eq!(r.status(), RefStatus::Unknown);
        r.set_status(RefStatus::Persisted).unwrap();
        r.set_status(RefStatus::Stored).unwrap();
        assert_eq!(r.status(), RefStatus::Persisted);
    }

    #[test]
    fn locked_status_cannot_be_lowered() {
        let r = big_cell().to_ref();
        r.set_status(RefStatus::Verified).unwrap();
        assert!(matches!(
            r.set_status(RefStatus::Persisted),
            Err(CellError::StatusDowngrade {
                from: RefStatus::Verified,
                to: RefStatus::Persisted
            })
        ));
    }

    #[test]
    fn invalidation_is_terminal_and_shared() {
        let r = big_cell().to_ref();
        let clone = r.clone();
        r.invalidate();
        assert_eq!(clone.status(), RefStatus::Invalid);
        assert!(clone.set_status(RefStatus::Announced).is_err());
    }

    #[test]
    fn soft_ref_without_store_reports_missing_data() {
        let hash = big_cell().hash();
        let r = Ref::soft(hash, None);
        assert!(r.try_value().is_none());
        assert!(matches!(r.value(), Err(CellError::MissingData(h)) if h == hash));
    }

    #[test]
    fn soft_ref_sees_value_while_held() {
        let cell = big_cell();
        let store: Arc<dyn CellStore> = crate::store::MemoryStore::in_memory();
        let soft = cell.to_ref().to_soft(&store);
        assert!(!soft.is_direct());
        assert_eq!(soft.value().unwrap(), cell);

        // Once the only strong handle is gone the value must come from the
        // store, which never saw it.
        let hash = cell.hash();
        drop(cell);
        assert!(soft.try_value().is_none());
        assert!(matches!(soft.value(), Err(CellError::MissingData(h)) if h == hash));
    }

    #[test]
    fn embedded_refs_never_become_soft() {
        let store: Arc<dyn CellStore> = crate::store::MemoryStore::in_memory();
        let r = Cell::integer(1).to_ref();
        let soft = r.to_soft(&store);
        assert!(soft.is_direct());
        assert!(soft.ptr_eq(&r));
    }

    #[test]
    fn equality_is_by_hash() {
        let cell = big_cell();
        let a = cell.to_ref();
        let b = Ref::soft(cell.hash(), None);
        assert_eq!(a, b);
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_raises_keep_the_highest_status() {
        use std::thread;

        let r = big_cell().to_ref();
        let order = [
            RefStatus::Stored,
            RefStatus::Announced,
            RefStatus::Persisted,
            RefStatus::Verified,
        ];
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let r = r.clone();
                let status = order[i % order.len()];
                thread::spawn(move || {
                    let result = r.set_status(status);
                    assert!(matches!(result, Ok(()) | Err(CellError::StatusDowngrade { .. })));
                    assert!(r.status() >= status);
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(r.status(), RefStatus::Announced);
    }
}
