//! Indexed record store
//!
//! `IndexedStore` is the shared core of a vault and a record set: the key
//! schema (names, types, template defaults, uniqueness), one
//! [`ErasedKeyIndex`] per key, and the records the store indexes.
//!
//! # Design
//!
//! - The store is plain data. Callers serialize access with their own lock.
//! - Records are shared, so a vault and its record sets index the same
//!   physical rows. Writing a cell is the caller's job; the store only keeps
//!   its indexes in step via [`IndexedStore::reindex`].
//! - Keys keep insertion order for listing.

use crate::index::{ErasedKeyIndex, KeyIndex};
use crate::record::VaultRecord;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use vault_core::{KeyValue, RecordId, TypeTag, TypedCell, VaultError, VaultResult};

/// Schema entry of one key
struct KeySlot {
    type_tag: TypeTag,
    template: TypedCell,
    unique: bool,
    index: Box<dyn ErasedKeyIndex>,
}

/// Schema, indexes and records of one vault or record set
pub struct IndexedStore {
    keys: Vec<String>,
    slots: FxHashMap<String, KeySlot>,
    records: FxHashMap<RecordId, Arc<VaultRecord>>,
}

impl IndexedStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty store with room for `capacity` records
    pub fn with_capacity(capacity: usize) -> Self {
        IndexedStore {
            keys: Vec::new(),
            slots: FxHashMap::default(),
            records: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    // ========================================================================
    // Schema
    // ========================================================================

    /// Whether `key` exists
    pub fn has_key(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Type of `key`
    pub fn key_type(&self, key: &str) -> Option<TypeTag> {
        self.slots.get(key).map(|s| s.type_tag)
    }

    /// Key names in insertion order
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Unique key names in insertion order
    pub fn unique_keys(&self) -> Vec<String> {
        self.keys
            .iter()
            .filter(|k| self.is_unique(k))
            .cloned()
            .collect()
    }

    /// Whether `key` is a unique key
    pub fn is_unique(&self, key: &str) -> bool {
        self.slots.get(key).map_or(false, |s| s.unique)
    }

    /// Template default of `key`
    pub fn template(&self, key: &str) -> Option<&TypedCell> {
        self.slots.get(key).map(|s| &s.template)
    }

    /// Replace the template default of `key`
    ///
    /// Returns the previous template, or `None` if the key is absent.
    pub fn set_template(&mut self, key: &str, cell: TypedCell) -> Option<TypedCell> {
        self.slots
            .get_mut(key)
            .map(|slot| std::mem::replace(&mut slot.template, cell))
    }

    /// A fresh copy of every template cell, as used for a new record
    pub fn template_cells(&self) -> FxHashMap<String, TypedCell> {
        self.slots
            .iter()
            .map(|(k, s)| (k.clone(), s.template.clone()))
            .collect()
    }

    /// Check that `key` exists and holds `requested`
    ///
    /// # Errors
    ///
    /// `WrongKey` if the key is absent, `WrongType` on a type mismatch.
    pub fn check_key(&self, key: &str, requested: TypeTag) -> VaultResult<()> {
        match self.key_type(key) {
            None => Err(VaultError::wrong_key(key)),
            Some(saved) if saved != requested => Err(VaultError::wrong_type(key, requested, saved)),
            Some(_) => Ok(()),
        }
    }

    /// Install a new key and index every member record under it
    ///
    /// Records must already hold a cell for `key`.
    pub fn install_key(
        &mut self,
        key: &str,
        template: TypedCell,
        unique: bool,
        mut index: Box<dyn ErasedKeyIndex>,
    ) {
        for record in self.records.values() {
            record.with_cell(key, |cell| index.add(cell, record));
        }
        let type_tag = index.type_tag();
        if self
            .slots
            .insert(
                key.to_string(),
                KeySlot {
                    type_tag,
                    template,
                    unique,
                    index,
                },
            )
            .is_none()
        {
            self.keys.push(key.to_string());
        }
        tracing::trace!(target: "vault::storage", key, records = self.records.len(), "key installed");
    }

    /// Remove `key` and its index
    ///
    /// Record cells are left alone. Returns the key's template, or `None`
    /// if the key is absent.
    pub fn remove_key(&mut self, key: &str) -> Option<TypedCell> {
        let slot = self.slots.remove(key)?;
        self.keys.retain(|k| k != key);
        Some(slot.template)
    }

    /// Mirror the schema of `other` with empty indexes
    ///
    /// Any current schema and membership are discarded.
    pub fn copy_schema_from(&mut self, other: &IndexedStore) {
        self.clear_schema();
        for key in &other.keys {
            if let Some(slot) = other.slots.get(key) {
                self.install_key(key, slot.template.clone(), slot.unique, slot.index.copy_empty());
            }
        }
    }

    /// Drop every key and record
    pub fn clear_schema(&mut self) {
        self.records.clear();
        self.slots.clear();
        self.keys.clear();
    }

    // ========================================================================
    // Indexes
    // ========================================================================

    /// Type-erased index of `key`
    pub fn index(&self, key: &str) -> Option<&dyn ErasedKeyIndex> {
        self.slots.get(key).map(|s| s.index.as_ref())
    }

    /// Typed index of `key`
    ///
    /// # Errors
    ///
    /// `WrongKey` if the key is absent, `WrongType` if it is not a `T` key.
    pub fn typed_index<T: KeyValue>(&self, key: &str) -> VaultResult<&KeyIndex<T>> {
        let slot = self.slots.get(key).ok_or_else(|| VaultError::wrong_key(key))?;
        slot.index
            .as_any()
            .downcast_ref::<KeyIndex<T>>()
            .ok_or_else(|| VaultError::wrong_type(key, TypeTag::of::<T>(), slot.type_tag))
    }

    /// Whether a record other than `except` holds the value of `cell` under `key`
    pub fn unique_conflict(&self, key: &str, cell: &TypedCell, except: Option<RecordId>) -> bool {
        self.index(key).map_or(false, |index| {
            index
                .holders(cell)
                .iter()
                .any(|r| Some(r.id()) != except)
        })
    }

    /// Move `record`'s entry under `key` from `old` to its current cell
    ///
    /// The caller has already written the new cell into the record.
    pub fn reindex(&mut self, key: &str, old: &TypedCell, record: &Arc<VaultRecord>) {
        if !self.records.contains_key(&record.id()) {
            return;
        }
        if let Some(slot) = self.slots.get_mut(key) {
            slot.index.erase(old, record.id());
            record.with_cell(key, |cell| slot.index.add(cell, record));
        }
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether record `id` is a member
    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    /// Member record `id`
    pub fn get(&self, id: RecordId) -> Option<&Arc<VaultRecord>> {
        self.records.get(&id)
    }

    /// Member records in no particular order
    pub fn records(&self) -> impl Iterator<Item = &Arc<VaultRecord>> {
        self.records.values()
    }

    /// Member records in creation order
    pub fn records_in_order(&self) -> Vec<Arc<VaultRecord>> {
        let mut out: Vec<_> = self.records.values().cloned().collect();
        out.sort_by_key(|r| r.id());
        out
    }

    /// Add `record` and index it under every key
    ///
    /// Returns false if it is already a member.
    pub fn insert_record(&mut self, record: Arc<VaultRecord>) -> bool {
        if self.records.contains_key(&record.id()) {
            return false;
        }
        for (key, slot) in self.slots.iter_mut() {
            record.with_cell(key, |cell| slot.index.add(cell, &record));
        }
        self.records.insert(record.id(), record);
        true
    }

    /// Remove record `id` and its index entries
    pub fn remove_record(&mut self, id: RecordId) -> Option<Arc<VaultRecord>> {
        let record = self.records.remove(&id)?;
        for (key, slot) in self.slots.iter_mut() {
            record.with_cell(key, |cell| slot.index.erase(cell, id));
        }
        Some(record)
    }

    /// Remove every record, keeping the schema
    pub fn clear_records(&mut self) -> Vec<Arc<VaultRecord>> {
        for slot in self.slots.values_mut() {
            slot.index.clear();
        }
        self.records.drain().map(|(_, r)| r).collect()
    }
}

impl Default for IndexedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IndexedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexedStore")
            .field("keys", &self.keys)
            .field("records", &self.records.len())
            .finish()
    }
}
