//! Vault records
//!
//! A record is one row: a map from key name to [`TypedCell`], a liveness
//! flag, and the ids of the record sets that currently contain it.
//!
//! # Design
//!
//! - Records are shared as `Arc<VaultRecord>` by the owning vault, every
//!   record set holding them and every outstanding handle. `invalidate`
//!   only marks the row dead; memory goes away with the last `Arc`.
//! - The record mutex is a leaf lock. Callbacks passed to
//!   [`VaultRecord::with_cell`] must not take any other lock.

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::sync::Arc;
use vault_core::{KeyValue, RecordId, SetId, TypeTag, TypedCell};

struct RecordState {
    alive: bool,
    cells: FxHashMap<String, TypedCell>,
    dependents: FxHashSet<SetId>,
}

/// One row of a vault
pub struct VaultRecord {
    id: RecordId,
    state: Mutex<RecordState>,
}

impl VaultRecord {
    /// Create a live record holding `cells`
    pub fn new(cells: FxHashMap<String, TypedCell>) -> Arc<Self> {
        Arc::new(VaultRecord {
            id: RecordId::next(),
            state: Mutex::new(RecordState {
                alive: true,
                cells,
                dependents: FxHashSet::default(),
            }),
        })
    }

    /// Identifier of this record
    #[inline]
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Whether the record is still alive
    pub fn is_valid(&self) -> bool {
        self.state.lock().alive
    }

    /// Mark the record dead
    ///
    /// # Returns
    ///
    /// The ids of the record sets that contained it. The registry is
    /// emptied, so a second call returns nothing.
    pub fn invalidate(&self) -> Vec<SetId> {
        let mut st = self.state.lock();
        st.alive = false;
        st.dependents.drain().collect()
    }

    /// Number of handles, sets and vaults sharing this record
    pub fn sharers(this: &Arc<Self>) -> usize {
        Arc::strong_count(this)
    }

    // ========================================================================
    // Cell access
    // ========================================================================

    /// Copy the value of `key` into `out`
    ///
    /// Returns false if the key is absent or holds another type.
    pub fn get_data<T: KeyValue>(&self, key: &str, out: &mut T) -> bool {
        self.state
            .lock()
            .cells
            .get(key)
            .map_or(false, |cell| cell.get(out))
    }

    /// Clone the value of `key`
    pub fn value<T: KeyValue>(&self, key: &str) -> Option<T> {
        self.state
            .lock()
            .cells
            .get(key)
            .and_then(|cell| cell.get_ref::<T>().cloned())
    }

    /// Clone the cell of `key`
    pub fn cell(&self, key: &str) -> Option<TypedCell> {
        self.state.lock().cells.get(key).cloned()
    }

    /// Run `f` against the cell of `key` while the record is locked
    pub fn with_cell<R>(&self, key: &str, f: impl FnOnce(&TypedCell) -> R) -> Option<R> {
        self.state.lock().cells.get(key).map(f)
    }

    /// Type of the cell stored under `key`
    pub fn cell_type(&self, key: &str) -> Option<TypeTag> {
        self.state.lock().cells.get(key).map(TypedCell::type_tag)
    }

    /// Replace the cell of `key`, returning the previous one
    ///
    /// The previous cell is handed back so its destructor runs after the
    /// record lock is released.
    pub fn set_cell(&self, key: &str, cell: TypedCell) -> Option<TypedCell> {
        let mut st = self.state.lock();
        match st.cells.get_mut(key) {
            Some(slot) => Some(std::mem::replace(slot, cell)),
            None => st.cells.insert(key.to_string(), cell),
        }
    }

    /// Remove the cell of `key`
    pub fn erase_data(&self, key: &str) -> Option<TypedCell> {
        self.state.lock().cells.remove(key)
    }

    /// Names of the keys stored in this record, in no particular order
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().cells.keys().cloned().collect()
    }

    // ========================================================================
    // Dependent record sets
    // ========================================================================

    /// Register a record set containing this record
    ///
    /// Dead records accept no new dependents.
    pub fn add_dependent(&self, set: SetId) -> bool {
        let mut st = self.state.lock();
        st.alive && st.dependents.insert(set)
    }

    /// Unregister a record set
    pub fn remove_dependent(&self, set: SetId) -> bool {
        self.state.lock().dependents.remove(&set)
    }

    /// Whether `set` is registered
    pub fn has_dependent(&self, set: SetId) -> bool {
        self.state.lock().dependents.contains(&set)
    }

    /// Snapshot of the registered record sets
    pub fn dependents(&self) -> Vec<SetId> {
        self.state.lock().dependents.iter().copied().collect()
    }
}

impl fmt::Debug for VaultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.lock();
        f.debug_struct("VaultRecord")
            .field("id", &self.id)
            .field("alive", &st.alive)
            .field("cells", &st.cells.len())
            .field("dependents", &st.dependents.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn record_with(key: &str, value: i32) -> Arc<VaultRecord> {
        let mut cells = FxHashMap::default();
        cells.insert(key.to_string(), TypedCell::of(value));
        VaultRecord::new(cells)
    }

    #[test]
    fn test_new_record_is_valid() {
        let rec = record_with("A", 1);
        assert!(rec.is_valid());
        assert_eq!(VaultRecord::sharers(&rec), 1);
        assert_eq!(rec.keys(), vec!["A".to_string()]);
    }

    #[test]
    fn test_get_and_set_data() {
        let rec = record_with("A", 1);
        let mut out = 0;
        assert!(rec.get_data("A", &mut out));
        assert_eq!(out, 1);

        let old = rec.set_cell("A", TypedCell::of(5i32));
        assert_eq!(old, Some(TypedCell::of(1i32)));
        assert_eq!(rec.value::<i32>("A"), Some(5));

        let mut wrong = String::from("keep");
        assert!(!rec.get_data("A", &mut wrong));
        assert_eq!(wrong, "keep");
        assert!(!rec.get_data("B", &mut out));
    }

    #[test]
    fn test_set_cell_inserts_new_key() {
        let rec = record_with("A", 1);
        assert!(rec.set_cell("B", TypedCell::of(true)).is_none());
        assert_eq!(rec.cell_type("B"), Some(TypeTag::of::<bool>()));
        assert!(rec.erase_data("B").is_some());
        assert!(rec.cell("B").is_none());
    }

    #[test]
    fn test_invalidate_returns_dependents_once() {
        let rec = record_with("A", 1);
        let s1 = SetId::next();
        let s2 = SetId::next();
        assert!(rec.add_dependent(s1));
        assert!(rec.add_dependent(s2));
        assert!(!rec.add_dependent(s1));

        let mut deps = rec.invalidate();
        deps.sort();
        assert_eq!(deps, vec![s1, s2]);
        assert!(!rec.is_valid());
        assert!(rec.invalidate().is_empty());
        assert!(!rec.add_dependent(s1));
    }

    #[test]
    fn test_invalidated_record_keeps_cells() {
        let rec = record_with("A", 9);
        let handle = Arc::clone(&rec);
        rec.invalidate();
        drop(rec);
        assert_eq!(handle.value::<i32>("A"), Some(9));
        assert_eq!(VaultRecord::sharers(&handle), 1);
    }

    #[test]
    fn test_concurrent_dependents() {
        let rec = record_with("A", 1);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rec = Arc::clone(&rec);
                thread::spawn(move || {
                    let id = SetId::next();
                    assert!(rec.add_dependent(id));
                    assert!(rec.has_dependent(id));
                    assert!(rec.remove_dependent(id));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(rec.dependents().is_empty());
    }
}
