//! Read surface shared by vaults and record sets
//!
//! A vault and a record set both expose an [`IndexedStore`] behind two
//! locks: the vault's outer lock and the owner's own store lock. The
//! [`RecordSource`] trait hides which owner is being read, so lookups,
//! sorted traversal and request evaluation are written once.
//!
//! # Lock discipline
//!
//! User callbacks (sort visitors, request filters) run while only the
//! vault's outer read lock is held. Store guards are always released
//! before a callback is invoked, so a callback may read or write through
//! any handle without deadlocking.

use crate::record_ref::VaultRecordRef;
use crate::record_set::VaultRecordSet;
use crate::request::{Candidates, Request};
use crate::vault::VaultShared;
use std::sync::{Arc, Weak};
use vault_core::{KeyValue, TypeTag, VaultError, VaultResult};
use vault_storage::{IndexedStore, VaultRecord};

/// Owner of an indexed store tied to a vault
pub(crate) trait RecordSource {
    /// Run `f` holding the owning vault's outer read lock
    ///
    /// `f` receives a weak link to the vault, dangling if there is none.
    fn with_vault_read<R>(&self, f: impl FnOnce(&Weak<VaultShared>) -> R) -> R;

    /// Run `f` with the store locked for reading
    fn with_store<R>(&self, f: impl FnOnce(&IndexedStore) -> R) -> R;
}

/// Run `f` with both the vault and the store locked for reading
pub(crate) fn read<S, R>(source: &S, f: impl FnOnce(&Weak<VaultShared>, &IndexedStore) -> R) -> R
where
    S: RecordSource,
{
    source.with_vault_read(|vault| source.with_store(|store| f(vault, store)))
}

pub(crate) fn to_refs(
    vault: &Weak<VaultShared>,
    records: impl IntoIterator<Item = Arc<VaultRecord>>,
) -> Vec<VaultRecordRef> {
    records
        .into_iter()
        .map(|record| VaultRecordRef::from_parts(vault.clone(), record))
        .collect()
}

// ============================================================================
// Store-level lookups
// ============================================================================

/// Template default of a non-unique key
///
/// # Errors
///
/// `WrongKey`, then `UniqueKey`, then `WrongType`.
pub(crate) fn key_value<T: KeyValue>(store: &IndexedStore, key: &str) -> VaultResult<T> {
    let saved = store.key_type(key).ok_or_else(|| VaultError::wrong_key(key))?;
    if store.is_unique(key) {
        return Err(VaultError::UniqueKey {
            key: key.to_string(),
        });
    }
    store
        .template(key)
        .and_then(|cell| cell.get_ref::<T>())
        .cloned()
        .ok_or_else(|| VaultError::wrong_type(key, TypeTag::of::<T>(), saved))
}

/// Records whose `key` equals `value`, at most `amount` of them
///
/// # Errors
///
/// `WrongKey`, `WrongType`, or `WrongValue` when no record matches.
pub(crate) fn lookup<T: KeyValue>(
    store: &IndexedStore,
    key: &str,
    value: &T,
    amount: Option<usize>,
) -> VaultResult<Candidates> {
    let found = store.typed_index::<T>(key)?.get(value);
    if found.is_empty() {
        return Err(VaultError::WrongValue {
            key: key.to_string(),
        });
    }
    Ok(found
        .iter()
        .take(amount.unwrap_or(usize::MAX))
        .cloned()
        .collect())
}

/// Records ordered by `key`, at most `amount` of them
pub(crate) fn sorted(
    store: &IndexedStore,
    key: &str,
    reverse: bool,
    amount: Option<usize>,
) -> VaultResult<Candidates> {
    let index = store.index(key).ok_or_else(|| VaultError::wrong_key(key))?;
    let cap = amount.unwrap_or(usize::MAX);
    let mut out = Vec::new();
    if cap == 0 {
        return Ok(out);
    }
    index.visit_sorted(reverse, &mut |record| {
        out.push(Arc::clone(record));
        out.len() < cap
    });
    Ok(out)
}

// ============================================================================
// Source-level operations
// ============================================================================

pub(crate) fn get_record<S: RecordSource, T: KeyValue>(
    source: &S,
    key: &str,
    value: &T,
) -> VaultResult<VaultRecordRef> {
    read(source, |vault, store| {
        let found = lookup(store, key, value, Some(1))?;
        to_refs(vault, found)
            .pop()
            .ok_or_else(|| VaultError::WrongValue {
                key: key.to_string(),
            })
    })
}

pub(crate) fn get_records<S: RecordSource, T: KeyValue>(
    source: &S,
    key: &str,
    value: &T,
    amount: Option<usize>,
) -> VaultResult<Vec<VaultRecordRef>> {
    read(source, |vault, store| {
        lookup(store, key, value, amount).map(|found| to_refs(vault, found))
    })
}

pub(crate) fn get_sorted_records<S: RecordSource>(
    source: &S,
    key: &str,
    reverse: bool,
    amount: Option<usize>,
) -> VaultResult<Vec<VaultRecordRef>> {
    read(source, |vault, store| {
        sorted(store, key, reverse, amount).map(|found| to_refs(vault, found))
    })
}

/// Visit records in `key` order until `visitor` returns false
///
/// The order is fixed before the first call, so the visitor may modify the
/// records it is handed.
pub(crate) fn sort_by<S, F>(
    source: &S,
    key: &str,
    mut visitor: F,
    reverse: bool,
    amount: Option<usize>,
) -> VaultResult<()>
where
    S: RecordSource,
    F: FnMut(&VaultRecordRef) -> bool,
{
    source.with_vault_read(|vault| {
        let snapshot = source.with_store(|store| sorted(store, key, reverse, amount))?;
        for record in snapshot {
            if !visitor(&VaultRecordRef::from_parts(vault.clone(), record)) {
                break;
            }
        }
        Ok(())
    })
}

pub(crate) fn records<S: RecordSource>(source: &S) -> Vec<VaultRecordRef> {
    read(source, |vault, store| to_refs(vault, store.records_in_order()))
}

/// Evaluate `request` against `source` and bind the result to `out`
///
/// `out` is reset first, so on error it is left empty and unbound.
pub(crate) fn request<S: RecordSource>(
    source: &S,
    request: &Request,
    out: &VaultRecordSet,
) -> VaultResult<()> {
    out.reset();
    source.with_vault_read(|vault| {
        let parent = vault.upgrade().ok_or(VaultError::ParentVaultNotValid)?;
        let (leaves, schema) = source.with_store(|store| -> VaultResult<_> {
            let leaves = request.collect(store)?;
            let mut schema = IndexedStore::new();
            schema.copy_schema_from(store);
            Ok((leaves, schema))
        })?;
        let records = request.combine(leaves, vault);
        out.bind(&parent, schema, records);
        Ok(())
    })
}
