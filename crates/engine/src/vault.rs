//! Vault: the root indexed record store
//!
//! A [`Vault`] owns a schema of typed keys, the authoritative set of live
//! records, one hash + ordered index per key, and the registry of record
//! sets that depend on it.
//!
//! # Design
//!
//! - Every public operation takes the vault's [`RecursiveRwLock`] first.
//!   The store behind it sits in a `parking_lot::RwLock` that is only held
//!   for short, callback-free sections.
//! - Schema changes and value changes fan out to dependent record sets
//!   while the vault's write lock is held, so no reader ever observes a
//!   set whose schema or indexes lag behind the vault.
//! - Dependent sets are referenced weakly through a `DashMap` keyed by
//!   [`SetId`]. A record knows the ids of the sets containing it.
//!
//! # Lock order
//!
//! vault outer lock, set outer lock, vault store, set store, record.
//! A record's lock is a leaf: nothing else is acquired while it is held.

use crate::options::VaultOptions;
use crate::record_ref::VaultRecordRef;
use crate::record_set::{SetShared, VaultRecordSet};
use crate::request::Request;
use crate::view;
use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::{Arc, Weak};
use vault_concurrency::RecursiveRwLock;
use vault_core::{KeyValue, SetId, TypeTag, TypedCell, VaultError, VaultId, VaultResult};
use vault_storage::{IndexedStore, KeyIndex, VaultRecord};

/// State shared by a vault, its record handles and its record sets
pub(crate) struct VaultShared {
    pub(crate) id: VaultId,
    name: Option<String>,
    pub(crate) lock: RecursiveRwLock,
    pub(crate) store: RwLock<IndexedStore>,
    dependents: DashMap<SetId, Weak<SetShared>>,
}

impl VaultShared {
    fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.to_string())
    }

    pub(crate) fn register(&self, set: &Arc<SetShared>) {
        self.dependents.insert(set.id, Arc::downgrade(set));
    }

    pub(crate) fn unregister(&self, id: SetId) {
        self.dependents.remove(&id);
    }

    /// Every live dependent set
    fn sets(&self) -> Vec<Arc<SetShared>> {
        self.dependents
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect()
    }

    /// Live dependent sets among `ids`
    fn sets_of(&self, ids: &[SetId]) -> Vec<Arc<SetShared>> {
        ids.iter()
            .filter_map(|id| self.dependents.get(id).and_then(|set| set.upgrade()))
            .collect()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        let _g = self.lock.read();
        let keys = self.store.read().keys().to_vec();
        keys
    }

    // ========================================================================
    // Record access (used by VaultRecordRef)
    // ========================================================================

    pub(crate) fn get_data<T: KeyValue>(&self, record: &VaultRecord, key: &str) -> VaultResult<T> {
        let _g = self.lock.read();
        self.store.read().check_key(key, TypeTag::of::<T>())?;
        if !record.is_valid() {
            return Err(VaultError::DataRecordNotValid);
        }
        record
            .value::<T>(key)
            .ok_or_else(|| VaultError::wrong_key(key))
    }

    pub(crate) fn get_data_as_string(&self, record: &VaultRecord, key: &str) -> VaultResult<String> {
        let _g = self.lock.read();
        if !self.store.read().has_key(key) {
            return Err(VaultError::wrong_key(key));
        }
        record
            .with_cell(key, |cell| cell.to_cell_string())
            .flatten()
            .ok_or_else(|| VaultError::WrongValue {
                key: key.to_string(),
            })
    }

    /// Parse `text` as a value of `key`'s type
    pub(crate) fn parse_cell(&self, key: &str, text: &str) -> VaultResult<TypedCell> {
        let _g = self.lock.read();
        let store = self.store.read();
        let index = store.index(key).ok_or_else(|| VaultError::wrong_key(key))?;
        index.parse_cell(text).ok_or_else(|| VaultError::WrongValue {
            key: key.to_string(),
        })
    }

    /// Write `cell` into `record` and move its index entries
    ///
    /// The vault's index for `key` and the index of every set containing
    /// the record are updated before the write lock is released.
    pub(crate) fn set_cell(&self, record: &Arc<VaultRecord>, key: &str, cell: TypedCell) -> VaultResult<()> {
        let _g = self.lock.write();
        let old = {
            let mut store = self.store.write();
            if !record.is_valid() || !store.contains(record.id()) {
                return Err(VaultError::DataRecordNotValid);
            }
            store.check_key(key, cell.type_tag())?;
            if store.is_unique(key) && store.unique_conflict(key, &cell, Some(record.id())) {
                return Err(VaultError::UniqueKeyValueAlreadyInSet {
                    key: key.to_string(),
                });
            }
            let old = record.set_cell(key, cell).unwrap_or_default();
            store.reindex(key, &old, record);
            old
        };
        for set in self.sets_of(&record.dependents()) {
            set.reindex(key, &old, record);
        }
        Ok(())
    }

    /// Erase member records, invalidate them and drop them from every set
    fn erase(&self, records: &[Arc<VaultRecord>]) -> usize {
        let _g = self.lock.write();
        let removed: Vec<_> = {
            let mut store = self.store.write();
            records
                .iter()
                .filter_map(|record| store.remove_record(record.id()))
                .collect()
        };
        for record in &removed {
            let sets = record.invalidate();
            for set in self.sets_of(&sets) {
                set.remove_record(record.id());
            }
        }
        removed.len()
    }
}

/// An in-memory table of typed, indexed records
///
/// Keys (columns) are added at runtime with any [`KeyValue`] type. Every key
/// is indexed for O(1) equality and O(log n) range lookup.
///
/// # Thread Safety
///
/// `Vault` is `Send + Sync`. Share it behind an `Arc` to use it from
/// several threads; readers run concurrently, writers are serialized and
/// preferred over new readers.
///
/// # Example
///
/// ```ignore
/// use vault_engine::{Vault, VaultRecordSet};
///
/// let vault = Vault::new();
/// vault.add_key("age", 0u32)?;
/// vault.add_key("name", String::new())?;
/// let alice = vault.create_record([("name", "alice".into()), ("age", 31u32.into())])?;
///
/// let adults = VaultRecordSet::new();
/// vault.request_greater_or_equal("age", 18u32, &adults)?;
/// assert!(adults.check_record(&alice));
/// ```
pub struct Vault {
    shared: Arc<VaultShared>,
}

impl Vault {
    /// Create an empty vault with default options
    pub fn new() -> Self {
        Self::with_options(VaultOptions::default())
    }

    /// Create an empty vault with the given options
    pub fn with_options(options: VaultOptions) -> Self {
        Vault {
            shared: Arc::new(VaultShared {
                id: VaultId::new(),
                name: options.name,
                lock: RecursiveRwLock::new(),
                store: RwLock::new(IndexedStore::with_capacity(options.record_capacity)),
                dependents: DashMap::new(),
            }),
        }
    }

    /// Identifier of this vault
    pub fn id(&self) -> VaultId {
        self.shared.id
    }

    /// Name given in [`VaultOptions`], if any
    pub fn name(&self) -> Option<&str> {
        self.shared.name.as_deref()
    }

    // ========================================================================
    // Schema
    // ========================================================================

    /// Add a key with a default value
    ///
    /// Every existing record and every dependent record set receives the key
    /// holding `default`.
    ///
    /// # Errors
    ///
    /// `DuplicateKey` if the key exists.
    pub fn add_key<T: KeyValue>(&self, key: &str, default: T) -> VaultResult<()> {
        let template = default.clone();
        self.install_key(key, template, false, |_, _| default.clone())
    }

    /// Add a unique key to an empty vault
    ///
    /// New records that do not set the key get `T::default()`, so at most
    /// one record may rely on the default at a time.
    ///
    /// # Errors
    ///
    /// `DuplicateKey`, or `TryToAddUniqueKeyInNonEmptyVaultWithoutLambda`
    /// if the vault holds records.
    pub fn add_unique_key<T: KeyValue + Default>(&self, key: &str) -> VaultResult<()> {
        let _g = self.shared.lock.write();
        {
            let store = self.shared.store.read();
            if store.has_key(key) {
                return Err(VaultError::DuplicateKey {
                    key: key.to_string(),
                });
            }
            if !store.is_empty() {
                return Err(VaultError::TryToAddUniqueKeyInNonEmptyVaultWithoutLambda {
                    key: key.to_string(),
                });
            }
        }
        self.install_key(key, T::default(), true, |_, _| T::default())
    }

    /// Add a unique key, computing a value for every existing record
    ///
    /// # Arguments
    ///
    /// * `generator` - called with the 0-based position of each record in
    ///   creation order and a handle to it
    ///
    /// # Errors
    ///
    /// `DuplicateKey`, or `UniqueKeyValueAlreadyInSet` if the generator
    /// produces the same value twice or creates or erases records. The key
    /// is not added on error.
    pub fn add_unique_key_with<T, F>(&self, key: &str, mut generator: F) -> VaultResult<()>
    where
        T: KeyValue + Default,
        F: FnMut(usize, &VaultRecordRef) -> T,
    {
        let vault = Arc::downgrade(&self.shared);
        self.install_key(key, T::default(), true, |position, record| {
            generator(position, &VaultRecordRef::from_parts(vault.clone(), Arc::clone(record)))
        })
    }

    fn install_key<T, F>(&self, key: &str, template: T, unique: bool, mut value_for: F) -> VaultResult<()>
    where
        T: KeyValue,
        F: FnMut(usize, &Arc<VaultRecord>) -> T,
    {
        let shared = &self.shared;
        let _g = shared.lock.write();
        let duplicate = || VaultError::DuplicateKey {
            key: key.to_string(),
        };

        let records = {
            let store = shared.store.read();
            if store.has_key(key) {
                return Err(duplicate());
            }
            store.records_in_order()
        };

        // Values are computed with no store guard held; the generator may
        // read through the handles it is given.
        let mut values = Vec::with_capacity(records.len());
        let mut seen = FxHashSet::default();
        for (position, record) in records.iter().enumerate() {
            let value = value_for(position, record);
            if unique && !seen.insert(value.clone()) {
                return Err(VaultError::UniqueKeyValueAlreadyInSet {
                    key: key.to_string(),
                });
            }
            values.push(value);
        }

        let proto = {
            let mut store = shared.store.write();
            if store.has_key(key) {
                return Err(duplicate());
            }
            // The generator may have created or erased records through the
            // vault; values exist only for the snapshot.
            let current = store.records_in_order();
            if current.len() != records.len()
                || current.iter().zip(&records).any(|(now, then)| !Arc::ptr_eq(now, then))
            {
                return Err(VaultError::UniqueKeyValueAlreadyInSet {
                    key: key.to_string(),
                });
            }
            for (record, value) in records.iter().zip(values) {
                record.set_cell(key, TypedCell::of(value));
            }
            store.install_key(key, TypedCell::of(template), unique, Box::new(KeyIndex::<T>::new()));
            store.template(key).cloned().unwrap_or_default()
        };

        for set in shared.sets() {
            set.install_key(key, proto.clone(), unique, Box::new(KeyIndex::<T>::new()));
        }
        tracing::debug!(
            target: "vault::engine",
            vault = %shared.label(),
            key,
            unique,
            records = records.len(),
            "key added"
        );
        Ok(())
    }

    /// Remove a key from the schema, every record and every dependent set
    ///
    /// Returns false if the key does not exist.
    pub fn remove_key(&self, key: &str) -> bool {
        let _g = self.shared.lock.write();
        let (template, erased) = {
            let mut store = self.shared.store.write();
            let template = match store.remove_key(key) {
                Some(template) => template,
                None => return false,
            };
            let erased: Vec<_> = store.records().filter_map(|r| r.erase_data(key)).collect();
            (template, erased)
        };
        let mirrored: Vec<_> = self
            .shared
            .sets()
            .iter()
            .filter_map(|set| set.remove_key(key))
            .collect();
        tracing::debug!(target: "vault::engine", vault = %self.shared.label(), key, "key removed");
        drop((template, erased, mirrored));
        true
    }

    /// Change the default of a non-unique key for future records
    ///
    /// # Errors
    ///
    /// `WrongKey`, `WrongType`, or `TryToUpdateUniqueKey`.
    pub fn update_key<T: KeyValue>(&self, key: &str, default: T) -> VaultResult<()> {
        let _g = self.shared.lock.write();
        let previous = {
            let mut store = self.shared.store.write();
            store.check_key(key, TypeTag::of::<T>())?;
            if store.is_unique(key) {
                return Err(VaultError::TryToUpdateUniqueKey {
                    key: key.to_string(),
                });
            }
            store.set_template(key, TypedCell::of(default.clone()))
        };
        let mirrored: Vec<_> = self
            .shared
            .sets()
            .iter()
            .filter_map(|set| set.set_template(key, TypedCell::of(default.clone())))
            .collect();
        tracing::debug!(target: "vault::engine", vault = %self.shared.label(), key, "key default updated");
        drop((previous, mirrored));
        Ok(())
    }

    /// Whether `key` exists
    pub fn is_key_exist(&self, key: &str) -> bool {
        view::read(&self.shared, |_, store| store.has_key(key))
    }

    /// Type of `key`
    pub fn get_key_type(&self, key: &str) -> Option<TypeTag> {
        view::read(&self.shared, |_, store| store.key_type(key))
    }

    /// Default value of `key`
    ///
    /// # Errors
    ///
    /// `WrongKey`, `UniqueKey` for unique keys, or `WrongType`.
    pub fn get_key_value<T: KeyValue>(&self, key: &str) -> VaultResult<T> {
        view::read(&self.shared, |_, store| view::key_value(store, key))
    }

    /// Keys in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.shared.keys()
    }

    /// Unique keys in insertion order
    pub fn unique_keys(&self) -> Vec<String> {
        view::read(&self.shared, |_, store| store.unique_keys())
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Create a record from the key defaults, overridden by `params`
    ///
    /// # Arguments
    ///
    /// * `params` - `(key, value)` pairs, checked in order
    ///
    /// # Errors
    ///
    /// The first `WrongKey` or `WrongType` among `params`, then
    /// `UniqueKeyValueAlreadyInSet` if any unique key's final value is
    /// already held. Nothing is inserted on error.
    pub fn create_record<I, K>(&self, params: I) -> VaultResult<VaultRecordRef>
    where
        I: IntoIterator<Item = (K, TypedCell)>,
        K: AsRef<str>,
    {
        let params: Vec<(String, TypedCell)> = params
            .into_iter()
            .map(|(key, cell)| (key.as_ref().to_string(), cell))
            .collect();
        let shared = &self.shared;
        let _g = shared.lock.write();

        let mut cells = {
            let store = shared.store.read();
            for (key, cell) in &params {
                store.check_key(key, cell.type_tag())?;
            }
            store.template_cells()
        };
        cells.extend(params);

        let record = {
            let mut store = shared.store.write();
            for key in store.unique_keys() {
                let taken = cells
                    .get(&key)
                    .map_or(false, |cell| store.unique_conflict(&key, cell, None));
                if taken {
                    return Err(VaultError::UniqueKeyValueAlreadyInSet { key });
                }
            }
            let record = VaultRecord::new(cells);
            store.insert_record(Arc::clone(&record));
            record
        };
        Ok(VaultRecordRef::new(shared, record))
    }

    /// Create a record holding only key defaults
    pub fn create_empty_record(&self) -> VaultResult<VaultRecordRef> {
        self.create_record(std::iter::empty::<(&str, TypedCell)>())
    }

    /// First record whose `key` equals `value`
    ///
    /// # Errors
    ///
    /// `WrongKey`, `WrongType`, or `WrongValue` if no record matches.
    pub fn get_record<T: KeyValue>(&self, key: &str, value: T) -> VaultResult<VaultRecordRef> {
        view::get_record(&self.shared, key, &value)
    }

    /// Records whose `key` equals `value`, at most `amount` when given
    pub fn get_records<T: KeyValue>(
        &self,
        key: &str,
        value: T,
        amount: Option<usize>,
    ) -> VaultResult<Vec<VaultRecordRef>> {
        view::get_records(&self.shared, key, &value, amount)
    }

    /// Every record, in creation order
    pub fn records(&self) -> Vec<VaultRecordRef> {
        view::records(&self.shared)
    }

    /// Number of live records
    pub fn size(&self) -> usize {
        view::read(&self.shared, |_, store| store.len())
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Evaluate `request` and bind the matching records to `out`
    ///
    /// # Errors
    ///
    /// The first leaf's `WrongKey` or `WrongType`. `out` is left reset.
    pub fn request(&self, request: &Request, out: &VaultRecordSet) -> VaultResult<()> {
        view::request(&self.shared, request, out)
    }

    /// Records whose `key` equals `value`
    pub fn request_equal<T: KeyValue>(&self, key: &str, value: T, out: &VaultRecordSet) -> VaultResult<()> {
        self.request(&Request::equal(key, value), out)
    }

    /// Records whose `key` is greater than `value`
    pub fn request_greater<T: KeyValue>(&self, key: &str, value: T, out: &VaultRecordSet) -> VaultResult<()> {
        self.request(&Request::greater(key, value), out)
    }

    /// Records whose `key` is greater than or equal to `value`
    pub fn request_greater_or_equal<T: KeyValue>(
        &self,
        key: &str,
        value: T,
        out: &VaultRecordSet,
    ) -> VaultResult<()> {
        self.request(&Request::greater_or_equal(key, value), out)
    }

    /// Records whose `key` is less than `value`
    pub fn request_less<T: KeyValue>(&self, key: &str, value: T, out: &VaultRecordSet) -> VaultResult<()> {
        self.request(&Request::less(key, value), out)
    }

    /// Records whose `key` is less than or equal to `value`
    pub fn request_less_or_equal<T: KeyValue>(
        &self,
        key: &str,
        value: T,
        out: &VaultRecordSet,
    ) -> VaultResult<()> {
        self.request(&Request::less_or_equal(key, value), out)
    }

    /// Records whose `key` lies between `begin` and `end`
    pub fn request_interval<T: KeyValue>(
        &self,
        key: &str,
        begin: T,
        end: T,
        include_begin: bool,
        include_end: bool,
        out: &VaultRecordSet,
    ) -> VaultResult<()> {
        self.request(&Request::interval(key, begin, end, include_begin, include_end), out)
    }

    // ========================================================================
    // Erasure
    // ========================================================================

    /// Erase the record behind `record`
    ///
    /// Every handle to it turns invalid and every set drops it. Returns
    /// false if the handle is invalid or belongs to another vault.
    pub fn erase_record(&self, record: &VaultRecordRef) -> bool {
        match record.target() {
            Some((vault, target)) if Arc::ptr_eq(&vault, &self.shared) => {
                self.shared.erase(&[target]) == 1
            }
            _ => false,
        }
    }

    /// Erase the first record whose `key` equals `value`
    ///
    /// # Errors
    ///
    /// `WrongKey`, `WrongType`, or `WrongValue` if no record matches.
    pub fn erase_record_by<T: KeyValue>(&self, key: &str, value: T) -> VaultResult<()> {
        self.erase_records(key, value, Some(1)).map(|_| ())
    }

    /// Erase records whose `key` equals `value`, at most `amount` when given
    ///
    /// # Returns
    ///
    /// The number of records erased.
    pub fn erase_records<T: KeyValue>(&self, key: &str, value: T, amount: Option<usize>) -> VaultResult<usize> {
        let _g = self.shared.lock.write();
        let victims = {
            let store = self.shared.store.read();
            view::lookup(&store, key, &value, amount)?
        };
        Ok(self.shared.erase(&victims))
    }

    /// Erase every record, keeping the schema and dependent sets
    ///
    /// Dependent sets stay bound with an intact schema and no members.
    pub fn drop_data(&self) {
        let shared = &self.shared;
        let _g = shared.lock.write();
        let drained = shared.store.write().clear_records();
        for record in &drained {
            record.invalidate();
        }
        for set in shared.sets() {
            set.clear_records();
        }
        tracing::debug!(target: "vault::engine", vault = %shared.label(), records = drained.len(), "data dropped");
    }

    /// Erase every record and key, and detach every dependent set
    pub fn drop_vault(&self) {
        let shared = &self.shared;
        let _g = shared.lock.write();
        let (drained, schema) = {
            let mut store = shared.store.write();
            let drained = store.clear_records();
            (drained, std::mem::take(&mut *store))
        };
        for record in &drained {
            record.invalidate();
        }
        let sets = shared.sets();
        shared.dependents.clear();
        for set in &sets {
            set.detach();
        }
        tracing::debug!(
            target: "vault::engine",
            vault = %shared.label(),
            records = drained.len(),
            sets = sets.len(),
            "vault dropped"
        );
        drop(schema);
    }

    // ========================================================================
    // Sorted traversal
    // ========================================================================

    /// Records ordered by `key`, at most `amount` when given
    ///
    /// # Errors
    ///
    /// `WrongKey` if the key does not exist.
    pub fn get_sorted_records(
        &self,
        key: &str,
        reverse: bool,
        amount: Option<usize>,
    ) -> VaultResult<Vec<VaultRecordRef>> {
        view::get_sorted_records(&self.shared, key, reverse, amount)
    }

    /// Visit records in `key` order until `visitor` returns false
    ///
    /// # Errors
    ///
    /// `WrongKey` if the key does not exist.
    pub fn sort_by<F>(&self, key: &str, visitor: F, reverse: bool, amount: Option<usize>) -> VaultResult<()>
    where
        F: FnMut(&VaultRecordRef) -> bool,
    {
        view::sort_by(&self.shared, key, visitor, reverse, amount)
    }
}

impl view::RecordSource for Arc<VaultShared> {
    fn with_vault_read<R>(&self, f: impl FnOnce(&Weak<VaultShared>) -> R) -> R {
        let _g = self.lock.read();
        f(&Arc::downgrade(self))
    }

    fn with_store<R>(&self, f: impl FnOnce(&IndexedStore) -> R) -> R {
        let _g = self.lock.read();
        let store = self.store.read();
        f(&store)
    }
}

impl Default for Vault {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Vault {
    fn drop(&mut self) {
        self.drop_vault();
    }
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("keys", &self.keys())
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_core::ResultCode;

    static_assertions::assert_impl_all!(Vault: Send, Sync);
    static_assertions::assert_not_impl_any!(Vault: Clone);

    fn vault_with_a(values: &[i32]) -> Vault {
        let vault = Vault::new();
        vault.add_key("A", 0i32).unwrap();
        for &v in values {
            vault.create_record([("A", TypedCell::of(v))]).unwrap();
        }
        vault
    }

    // === Schema Tests ===

    #[test]
    fn test_add_key_backfills_default() {
        let vault = vault_with_a(&[1, 2]);
        vault.add_key("B", String::from("x")).unwrap();
        for r in vault.records() {
            assert_eq!(r.get_data::<String>("B").unwrap(), "x");
        }
        assert_eq!(vault.get_key_value::<String>("B").unwrap(), "x");
        assert_eq!(
            vault.add_key("B", 1u8).unwrap_err(),
            VaultError::DuplicateKey { key: "B".into() }
        );
    }

    #[test]
    fn test_remove_absent_key() {
        let vault = vault_with_a(&[]);
        assert!(!vault.remove_key("Z"));
        assert_eq!(vault.keys(), vec!["A".to_string()]);
        assert!(vault.remove_key("A"));
        assert!(vault.keys().is_empty());
    }

    #[test]
    fn test_update_key_errors() {
        let vault = vault_with_a(&[]);
        vault.add_unique_key::<u64>("id").unwrap();
        assert_eq!(ResultCode::of(&vault.update_key("Z", 1i32)), ResultCode::WrongKey);
        assert_eq!(ResultCode::of(&vault.update_key("A", 1u8)), ResultCode::WrongType);
        assert_eq!(
            ResultCode::of(&vault.update_key("id", 3u64)),
            ResultCode::TryToUpdateUniqueKey
        );
        vault.update_key("A", 9i32).unwrap();
        let r = vault.create_empty_record().unwrap();
        assert_eq!(r.get_data::<i32>("A").unwrap(), 9);
    }

    #[test]
    fn test_get_key_value_errors() {
        let vault = vault_with_a(&[]);
        vault.add_unique_key::<u64>("id").unwrap();
        assert_eq!(ResultCode::of(&vault.get_key_value::<i32>("Z")), ResultCode::WrongKey);
        assert_eq!(ResultCode::of(&vault.get_key_value::<u64>("id")), ResultCode::UniqueKey);
        let err = vault.get_key_value::<u8>("A").unwrap_err();
        assert_eq!(err.requested_type(), Some(TypeTag::of::<u8>()));
        assert_eq!(err.saved_type(), Some(TypeTag::of::<i32>()));
    }

    // === Record Tests ===

    #[test]
    fn test_create_record_aborts_on_first_error() {
        let vault = vault_with_a(&[]);
        let err = vault
            .create_record([("A", TypedCell::of(1i32)), ("B", TypedCell::of(2i32))])
            .unwrap_err();
        assert_eq!(err, VaultError::wrong_key("B"));
        assert_eq!(vault.size(), 0);

        let err = vault.create_record([("A", TypedCell::of(1u8))]).unwrap_err();
        assert_eq!(err.code(), ResultCode::WrongType);
        assert_eq!(vault.size(), 0);
    }

    #[test]
    fn test_unique_collision_on_create() {
        let vault = Vault::new();
        vault.add_unique_key::<u32>("id").unwrap();
        vault.create_record([("id", TypedCell::of(1u32))]).unwrap();
        let err = vault.create_record([("id", TypedCell::of(1u32))]).unwrap_err();
        assert_eq!(err.code(), ResultCode::UniqueKeyValueAlreadyInSet);
        assert_eq!(vault.size(), 1);
    }

    #[test]
    fn test_erase_by_value() {
        let vault = vault_with_a(&[1, 2, 2, 2]);
        assert_eq!(ResultCode::of(&vault.erase_record_by("A", 7)), ResultCode::WrongValue);
        vault.erase_record_by("A", 1).unwrap();
        assert_eq!(vault.erase_records("A", 2, Some(2)).unwrap(), 2);
        assert_eq!(vault.size(), 1);
        assert_eq!(vault.erase_records("A", 2, None).unwrap(), 1);
        assert_eq!(vault.size(), 0);
    }

    #[test]
    fn test_drop_vault_clears_schema() {
        let vault = vault_with_a(&[1, 2]);
        let r = vault.get_record("A", 1).unwrap();
        vault.drop_vault();
        assert!(!r.is_valid());
        assert_eq!(vault.size(), 0);
        assert!(vault.keys().is_empty());
    }

    #[test]
    fn test_options_name() {
        let vault = Vault::with_options(VaultOptions::new().name("users").record_capacity(8));
        assert_eq!(vault.name(), Some("users"));
        assert!(format!("{:?}", vault).contains("users"));
    }
}
