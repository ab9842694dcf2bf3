//! Record sets: live subsets of a vault
//!
//! A [`VaultRecordSet`] mirrors its parent vault's schema and indexes a
//! subset of its records. It is filled by a request, by set algebra or by
//! adding records one by one, and the parent keeps it in step afterwards:
//! key changes, value changes and erasures all reach the set while the
//! vault's write lock is held.
//!
//! # States
//!
//! - *Unbound*: no parent, no keys, no records. A fresh set starts here.
//! - *Bound*: tracks one vault. Any request into the set rebinds it.
//!
//! `drop_data` on the parent empties a bound set but keeps it bound;
//! `drop_vault` (or dropping the vault) unbinds it.

use crate::record_ref::VaultRecordRef;
use crate::request::{Candidates, Request};
use crate::vault::VaultShared;
use crate::view::{self, RecordSource};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::{Arc, Weak};
use vault_concurrency::RecursiveRwLock;
use vault_core::{KeyValue, RecordId, SetId, TypeTag, TypedCell, VaultError, VaultId, VaultResult};
use vault_storage::{ErasedKeyIndex, IndexedStore, VaultRecord};

/// State of one record set, reachable from its parent vault's registry
pub(crate) struct SetShared {
    pub(crate) id: SetId,
    lock: RecursiveRwLock,
    store: RwLock<IndexedStore>,
    parent: Mutex<Option<Weak<VaultShared>>>,
}

impl SetShared {
    fn new() -> Arc<Self> {
        Arc::new(SetShared {
            id: SetId::next(),
            lock: RecursiveRwLock::new(),
            store: RwLock::new(IndexedStore::new()),
            parent: Mutex::new(None),
        })
    }

    pub(crate) fn parent(&self) -> Option<Arc<VaultShared>> {
        self.parent.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Member records in creation order
    fn snapshot(&self) -> Candidates {
        let _g = self.lock.read();
        let records = self.store.read().records_in_order();
        records
    }

    fn member_ids(&self) -> FxHashSet<RecordId> {
        let _g = self.lock.read();
        let ids = self.store.read().records().map(|r| r.id()).collect();
        ids
    }

    // ========================================================================
    // Propagation from the parent vault
    //
    // The caller holds the parent's write lock.
    // ========================================================================

    pub(crate) fn install_key(
        &self,
        key: &str,
        template: TypedCell,
        unique: bool,
        index: Box<dyn ErasedKeyIndex>,
    ) {
        let _g = self.lock.write();
        self.store.write().install_key(key, template, unique, index);
    }

    pub(crate) fn remove_key(&self, key: &str) -> Option<TypedCell> {
        let _g = self.lock.write();
        let template = self.store.write().remove_key(key);
        template
    }

    pub(crate) fn set_template(&self, key: &str, cell: TypedCell) -> Option<TypedCell> {
        let _g = self.lock.write();
        let previous = self.store.write().set_template(key, cell);
        previous
    }

    pub(crate) fn reindex(&self, key: &str, old: &TypedCell, record: &Arc<VaultRecord>) {
        let _g = self.lock.write();
        self.store.write().reindex(key, old, record);
    }

    pub(crate) fn remove_record(&self, id: RecordId) -> Option<Arc<VaultRecord>> {
        let _g = self.lock.write();
        let removed = self.store.write().remove_record(id);
        if let Some(record) = &removed {
            record.remove_dependent(self.id);
        }
        removed
    }

    pub(crate) fn clear_records(&self) -> Vec<Arc<VaultRecord>> {
        let _g = self.lock.write();
        let drained = self.store.write().clear_records();
        for record in &drained {
            record.remove_dependent(self.id);
        }
        drained
    }

    /// Forget the parent, its schema and every member
    pub(crate) fn detach(&self) {
        let _g = self.lock.write();
        let (drained, schema) = {
            let mut store = self.store.write();
            let drained = store.clear_records();
            (drained, std::mem::take(&mut *store))
        };
        for record in &drained {
            record.remove_dependent(self.id);
        }
        *self.parent.lock() = None;
        tracing::trace!(target: "vault::engine", set = %self.id, "record set detached");
        drop((drained, schema));
    }

    // ========================================================================
    // Binding
    // ========================================================================

    /// Make this set a view of `vault` holding `records`
    ///
    /// The caller holds `vault`'s read lock. Records that died since they
    /// were selected are skipped.
    pub(crate) fn bind(self: &Arc<Self>, vault: &Arc<VaultShared>, schema: IndexedStore, records: Candidates) {
        let _g = self.lock.write();
        let (stale, old_schema, size) = {
            let mut store = self.store.write();
            let stale = store.clear_records();
            for record in &stale {
                record.remove_dependent(self.id);
            }
            let old_schema = std::mem::replace(&mut *store, schema);
            for record in records {
                if record.add_dependent(self.id) {
                    store.insert_record(record);
                }
            }
            (stale, old_schema, store.len())
        };
        let previous = self.parent.lock().replace(Arc::downgrade(vault));
        if let Some(old) = previous.and_then(|w| w.upgrade()) {
            if !Arc::ptr_eq(&old, vault) {
                old.unregister(self.id);
            }
        }
        vault.register(self);
        tracing::trace!(target: "vault::engine", set = %self.id, records = size, "record set bound");
        drop((stale, old_schema));
    }

    /// Unbind from the parent and forget schema and members
    fn reset(&self) {
        let parent = self.parent();
        let _vault_guard = parent.as_ref().map(|vault| vault.lock.read());
        let _g = self.lock.write();
        let (drained, schema) = {
            let mut store = self.store.write();
            let drained = store.clear_records();
            (drained, std::mem::take(&mut *store))
        };
        for record in &drained {
            record.remove_dependent(self.id);
        }
        if let Some(vault) = &parent {
            vault.unregister(self.id);
        }
        *self.parent.lock() = None;
        drop((drained, schema));
    }
}

impl RecordSource for Arc<SetShared> {
    fn with_vault_read<R>(&self, f: impl FnOnce(&Weak<VaultShared>) -> R) -> R {
        match self.parent() {
            Some(vault) => {
                let _g = vault.lock.read();
                f(&Arc::downgrade(&vault))
            }
            None => f(&Weak::new()),
        }
    }

    fn with_store<R>(&self, f: impl FnOnce(&IndexedStore) -> R) -> R {
        let _g = self.lock.read();
        let store = self.store.read();
        f(&store)
    }
}

/// A live subset of a vault's records
///
/// Sets share records with their vault: a value written through any
/// handle is visible through the set, and an erased record leaves the set.
///
/// # Example
///
/// ```ignore
/// let young = VaultRecordSet::new();
/// vault.request_less("age", 30u32, &young)?;
///
/// let named_bob = VaultRecordSet::new();
/// young.request_equal("name", String::from("bob"), &named_bob)?;
/// ```
pub struct VaultRecordSet {
    shared: Arc<SetShared>,
}

impl VaultRecordSet {
    /// Create an unbound, empty set
    pub fn new() -> Self {
        VaultRecordSet {
            shared: SetShared::new(),
        }
    }

    pub(crate) fn bind(&self, vault: &Arc<VaultShared>, schema: IndexedStore, records: Candidates) {
        self.shared.bind(vault, schema, records);
    }

    /// Unbind from the parent vault and forget schema and members
    pub fn reset(&self) {
        self.shared.reset();
    }

    /// Remove every member, keeping the schema and the parent
    pub fn clear(&self) {
        let parent = self.shared.parent();
        let _vault_guard = parent.as_ref().map(|vault| vault.lock.read());
        self.shared.clear_records();
    }

    /// Whether the set is bound to a live vault
    pub fn is_parent_vault_valid(&self) -> bool {
        self.shared.parent().is_some()
    }

    /// Id of the parent vault, if bound
    pub fn parent_vault_id(&self) -> Option<VaultId> {
        self.shared.parent().map(|vault| vault.id)
    }

    // ========================================================================
    // Membership
    // ========================================================================

    /// Add one record of the parent vault
    ///
    /// # Errors
    ///
    /// `ParentVaultNotValid` for an unbound set, `DataRecordNotValid` for an
    /// invalid handle, `ParentVaultNotMatch` for a record of another vault,
    /// `RecordAlreadyInSet` if it is already a member.
    pub fn add_record(&self, record: &VaultRecordRef) -> VaultResult<()> {
        let vault = self.shared.parent().ok_or(VaultError::ParentVaultNotValid)?;
        let (owner, target) = record.target().ok_or(VaultError::DataRecordNotValid)?;
        if !Arc::ptr_eq(&vault, &owner) {
            return Err(VaultError::ParentVaultNotMatch);
        }
        let _vault_guard = vault.lock.read();
        self.ensure_parent(&vault, VaultError::ParentVaultNotValid)?;
        let _g = self.shared.lock.write();
        let mut store = self.shared.store.write();
        if store.contains(target.id()) {
            return Err(VaultError::RecordAlreadyInSet);
        }
        if !target.add_dependent(self.shared.id) {
            return Err(VaultError::DataRecordNotValid);
        }
        store.insert_record(target);
        Ok(())
    }

    /// Add several records, stopping at the first error
    pub fn add_records<'a, I>(&self, records: I) -> VaultResult<()>
    where
        I: IntoIterator<Item = &'a VaultRecordRef>,
    {
        for record in records {
            self.add_record(record)?;
        }
        Ok(())
    }

    /// Drop a record from the set without touching it
    ///
    /// Returns false if it was not a member.
    pub fn remove_record(&self, record: &VaultRecordRef) -> bool {
        let id = match record.record_id() {
            Some(id) => id,
            None => return false,
        };
        let parent = self.shared.parent();
        let _vault_guard = parent.as_ref().map(|vault| vault.lock.read());
        self.shared.remove_record(id).is_some()
    }

    /// Whether the record is a member
    pub fn check_record(&self, record: &VaultRecordRef) -> bool {
        match record.record_id() {
            Some(id) => view::read(&self.shared, |_, store| store.contains(id)),
            None => false,
        }
    }

    /// Fail with `error` unless the set is still bound to `vault`
    ///
    /// Call with `vault`'s outer lock held; `drop_vault` detaches sets under
    /// its write lock.
    fn ensure_parent(&self, vault: &Arc<VaultShared>, error: VaultError) -> VaultResult<()> {
        match self.shared.parent() {
            Some(parent) if Arc::ptr_eq(&parent, vault) => Ok(()),
            _ => Err(error),
        }
    }

    /// Re-check both parents once the vault's lock is held
    fn ensure_shared_parent(&self, other: &VaultRecordSet, vault: &Arc<VaultShared>) -> VaultResult<()> {
        self.ensure_parent(vault, VaultError::ParentVaultNotValid)?;
        other.ensure_parent(vault, VaultError::OtherParentVaultNotValid)
    }

    fn shared_parent(&self, other: &VaultRecordSet) -> VaultResult<Arc<VaultShared>> {
        if std::ptr::eq(self, other) {
            return Err(VaultError::SameVaultRecordSet);
        }
        let parent = self.shared.parent().ok_or(VaultError::ParentVaultNotValid)?;
        let other_parent = other
            .shared
            .parent()
            .ok_or(VaultError::OtherParentVaultNotValid)?;
        if !Arc::ptr_eq(&parent, &other_parent) {
            return Err(VaultError::ParentVaultNotMatch);
        }
        Ok(parent)
    }

    /// Add every member of `other`
    ///
    /// # Errors
    ///
    /// `SameVaultRecordSet`, `ParentVaultNotValid`,
    /// `OtherParentVaultNotValid`, or `ParentVaultNotMatch`.
    pub fn join(&self, other: &VaultRecordSet) -> VaultResult<()> {
        let vault = self.shared_parent(other)?;
        let _vault_guard = vault.lock.read();
        self.ensure_shared_parent(other, &vault)?;
        let theirs = other.shared.snapshot();
        let _g = self.shared.lock.write();
        let mut store = self.shared.store.write();
        for record in theirs {
            if !store.contains(record.id()) && record.add_dependent(self.shared.id) {
                store.insert_record(record);
            }
        }
        Ok(())
    }

    /// Remove every member of `other`
    ///
    /// # Errors
    ///
    /// Same as [`join`](Self::join).
    pub fn exclude(&self, other: &VaultRecordSet) -> VaultResult<()> {
        let vault = self.shared_parent(other)?;
        let _vault_guard = vault.lock.read();
        self.ensure_shared_parent(other, &vault)?;
        let theirs = other.shared.snapshot();
        for record in theirs {
            self.shared.remove_record(record.id());
        }
        Ok(())
    }

    /// Keep only members also in `other`
    ///
    /// # Errors
    ///
    /// Same as [`join`](Self::join).
    pub fn intersect(&self, other: &VaultRecordSet) -> VaultResult<()> {
        let vault = self.shared_parent(other)?;
        let _vault_guard = vault.lock.read();
        self.ensure_shared_parent(other, &vault)?;
        let keep = other.shared.member_ids();
        let ours = self.shared.snapshot();
        for record in ours.iter().filter(|r| !keep.contains(&r.id())) {
            self.shared.remove_record(record.id());
        }
        Ok(())
    }

    // ========================================================================
    // Read surface
    // ========================================================================

    /// Number of members
    pub fn size(&self) -> usize {
        view::read(&self.shared, |_, store| store.len())
    }

    /// Keys in the parent's insertion order
    pub fn keys(&self) -> Vec<String> {
        view::read(&self.shared, |_, store| store.keys().to_vec())
    }

    /// Unique keys in insertion order
    pub fn unique_keys(&self) -> Vec<String> {
        view::read(&self.shared, |_, store| store.unique_keys())
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
    /// `WrongKey`, `UniqueKey`, or `WrongType`.
    pub fn get_key_value<T: KeyValue>(&self, key: &str) -> VaultResult<T> {
        view::read(&self.shared, |_, store| view::key_value(store, key))
    }

    /// First member whose `key` equals `value`
    pub fn get_record<T: KeyValue>(&self, key: &str, value: T) -> VaultResult<VaultRecordRef> {
        view::get_record(&self.shared, key, &value)
    }

    /// Members whose `key` equals `value`, at most `amount` when given
    pub fn get_records<T: KeyValue>(
        &self,
        key: &str,
        value: T,
        amount: Option<usize>,
    ) -> VaultResult<Vec<VaultRecordRef>> {
        view::get_records(&self.shared, key, &value, amount)
    }

    /// Every member, in creation order
    pub fn records(&self) -> Vec<VaultRecordRef> {
        view::records(&self.shared)
    }

    /// Members ordered by `key`, at most `amount` when given
    pub fn get_sorted_records(
        &self,
        key: &str,
        reverse: bool,
        amount: Option<usize>,
    ) -> VaultResult<Vec<VaultRecordRef>> {
        view::get_sorted_records(&self.shared, key, reverse, amount)
    }

    /// Visit members in `key` order until `visitor` returns false
    pub fn sort_by<F>(&self, key: &str, visitor: F, reverse: bool, amount: Option<usize>) -> VaultResult<()>
    where
        F: FnMut(&VaultRecordRef) -> bool,
    {
        view::sort_by(&self.shared, key, visitor, reverse, amount)
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Evaluate `request` over the members and bind the result to `out`
    ///
    /// `out` becomes a view of the same parent vault.
    ///
    /// # Errors
    ///
    /// `SameVaultRecordSet` if `out` is this set, `ParentVaultNotValid` for
    /// an unbound set, or the first leaf's `WrongKey`/`WrongType`.
    pub fn request(&self, request: &Request, out: &VaultRecordSet) -> VaultResult<()> {
        if std::ptr::eq(self, out) {
            return Err(VaultError::SameVaultRecordSet);
        }
        view::request(&self.shared, request, out)
    }

    /// Members whose `key` equals `value`
    pub fn request_equal<T: KeyValue>(&self, key: &str, value: T, out: &VaultRecordSet) -> VaultResult<()> {
        self.request(&Request::equal(key, value), out)
    }

    /// Members whose `key` is greater than `value`
    pub fn request_greater<T: KeyValue>(&self, key: &str, value: T, out: &VaultRecordSet) -> VaultResult<()> {
        self.request(&Request::greater(key, value), out)
    }

    /// Members whose `key` is greater than or equal to `value`
    pub fn request_greater_or_equal<T: KeyValue>(
        &self,
        key: &str,
        value: T,
        out: &VaultRecordSet,
    ) -> VaultResult<()> {
        self.request(&Request::greater_or_equal(key, value), out)
    }

    /// Members whose `key` is less than `value`
    pub fn request_less<T: KeyValue>(&self, key: &str, value: T, out: &VaultRecordSet) -> VaultResult<()> {
        self.request(&Request::less(key, value), out)
    }

    /// Members whose `key` is less than or equal to `value`
    pub fn request_less_or_equal<T: KeyValue>(
        &self,
        key: &str,
        value: T,
        out: &VaultRecordSet,
    ) -> VaultResult<()> {
        self.request(&Request::less_or_equal(key, value), out)
    }

    /// Members whose `key` lies between `begin` and `end`
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
}

// ============================================================================
// Set algebra into a third set
// ============================================================================

fn combine_into<F>(a: &VaultRecordSet, b: &VaultRecordSet, out: &VaultRecordSet, merge: F) -> VaultResult<()>
where
    F: FnOnce(Candidates, Candidates) -> Candidates,
{
    if std::ptr::eq(a, out) || std::ptr::eq(b, out) {
        return Err(VaultError::SameVaultRecordSet);
    }
    let vault = a.shared_parent(b)?;
    out.reset();
    let _vault_guard = vault.lock.read();
    a.ensure_shared_parent(b, &vault)?;
    let left = a.shared.snapshot();
    let right = b.shared.snapshot();
    let schema = {
        let store = vault.store.read();
        let mut schema = IndexedStore::new();
        schema.copy_schema_from(&store);
        schema
    };
    out.bind(&vault, schema, merge(left, right));
    Ok(())
}

/// Bind `out` to the members of `a` or `b`
///
/// # Errors
///
/// `SameVaultRecordSet` if `out` is `a` or `b`, or if `a` is `b`; otherwise
/// the errors of [`VaultRecordSet::join`].
pub fn union(a: &VaultRecordSet, b: &VaultRecordSet, out: &VaultRecordSet) -> VaultResult<()> {
    combine_into(a, b, out, |mut left, right| {
        let mut seen: FxHashSet<_> = left.iter().map(|r| r.id()).collect();
        left.extend(right.into_iter().filter(|r| seen.insert(r.id())));
        left
    })
}

/// Bind `out` to the members of both `a` and `b`
///
/// # Errors
///
/// Same as [`union`].
pub fn intersection(a: &VaultRecordSet, b: &VaultRecordSet, out: &VaultRecordSet) -> VaultResult<()> {
    combine_into(a, b, out, |left, right| {
        let keep: FxHashSet<_> = right.iter().map(|r| r.id()).collect();
        left.into_iter().filter(|r| keep.contains(&r.id())).collect()
    })
}

impl Default for VaultRecordSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VaultRecordSet {
    fn drop(&mut self) {
        self.shared.reset();
    }
}

impl Clone for VaultRecordSet {
    /// A new set bound to the same parent with the same members
    fn clone(&self) -> Self {
        let copy = VaultRecordSet::new();
        if let Some(vault) = self.shared.parent() {
            let _vault_guard = vault.lock.read();
            let (schema, records) = self.shared.with_store(|store| {
                let mut schema = IndexedStore::new();
                schema.copy_schema_from(store);
                (schema, store.records_in_order())
            });
            copy.bind(&vault, schema, records);
        }
        copy
    }
}

impl PartialEq for VaultRecordSet {
    /// Same parent vault and same members
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let same_parent = match (self.shared.parent(), other.shared.parent()) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
            (None, None) => true,
            _ => false,
        };
        same_parent && self.shared.member_ids() == other.shared.member_ids()
    }
}

impl fmt::Debug for VaultRecordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultRecordSet")
            .field("id", &self.shared.id)
            .field("parent", &self.parent_vault_id())
            .field("size", &self.size())
            .finish()
    }
}
