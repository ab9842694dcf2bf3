//! Shared handles to vault records
//!
//! A [`VaultRecordRef`] pairs a record with the vault that owns it. All typed
//! access goes through the vault, so the vault's indexes and every dependent
//! record set see a change made through any handle.
//!
//! # Design
//!
//! - The handle keeps a weak link to the vault and a strong link to the
//!   record. An erased record stays readable in memory but the handle
//!   reports it invalid and refuses access.
//! - A private mutex makes clone, compare and reset atomic without touching
//!   the vault lock.

use crate::vault::VaultShared;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use vault_core::{KeyValue, RecordId, TypedCell, VaultError, VaultResult};
use vault_storage::VaultRecord;

#[derive(Clone, Default)]
struct RefTarget {
    vault: Weak<VaultShared>,
    record: Option<Arc<VaultRecord>>,
}

impl RefTarget {
    fn is_valid(&self) -> bool {
        self.vault.strong_count() > 0 && self.record.as_ref().map_or(false, |r| r.is_valid())
    }
}

/// Handle to one record of a vault
///
/// A default-constructed handle points nowhere and is invalid. Two invalid
/// handles compare equal.
#[derive(Default)]
pub struct VaultRecordRef {
    target: Mutex<RefTarget>,
}

impl VaultRecordRef {
    pub(crate) fn new(vault: &Arc<VaultShared>, record: Arc<VaultRecord>) -> Self {
        Self::from_parts(Arc::downgrade(vault), record)
    }

    pub(crate) fn from_parts(vault: Weak<VaultShared>, record: Arc<VaultRecord>) -> Self {
        VaultRecordRef {
            target: Mutex::new(RefTarget {
                vault,
                record: Some(record),
            }),
        }
    }

    /// Live vault and record, or `None` if the handle is invalid
    pub(crate) fn target(&self) -> Option<(Arc<VaultShared>, Arc<VaultRecord>)> {
        let t = self.target.lock().clone();
        let record = t.record.filter(|r| r.is_valid())?;
        let vault = t.vault.upgrade()?;
        Some((vault, record))
    }

    fn live_target(&self) -> VaultResult<(Arc<VaultShared>, Arc<VaultRecord>)> {
        self.target().ok_or(VaultError::DataRecordNotValid)
    }

    /// Whether the record is alive and its vault still exists
    pub fn is_valid(&self) -> bool {
        self.target.lock().is_valid()
    }

    /// Read the value of `key`
    ///
    /// # Errors
    ///
    /// `DataRecordNotValid`, `WrongKey`, or `WrongType` if `T` is not the
    /// key's type.
    pub fn get_data<T: KeyValue>(&self, key: &str) -> VaultResult<T> {
        let (vault, record) = self.live_target()?;
        vault.get_data(&record, key)
    }

    /// Set the value of `key`
    ///
    /// The vault's indexes and every record set containing this record are
    /// updated before the call returns.
    ///
    /// # Errors
    ///
    /// `DataRecordNotValid`, `WrongKey`, `WrongType`, or
    /// `UniqueKeyValueAlreadyInSet` when another record holds the value of a
    /// unique key.
    pub fn set_data<T: KeyValue>(&self, key: &str, value: T) -> VaultResult<()> {
        let (vault, record) = self.live_target()?;
        vault.set_cell(&record, key, TypedCell::of(value))
    }

    /// Set several keys, stopping at the first error
    ///
    /// Keys set before the failing one keep their new values.
    pub fn set_data_many<I, K>(&self, params: I) -> VaultResult<()>
    where
        I: IntoIterator<Item = (K, TypedCell)>,
        K: AsRef<str>,
    {
        let (vault, record) = self.live_target()?;
        for (key, cell) in params {
            vault.set_cell(&record, key.as_ref(), cell)?;
        }
        Ok(())
    }

    /// Textual form of the value of `key`
    pub fn get_data_as_string(&self, key: &str) -> VaultResult<String> {
        let (vault, record) = self.live_target()?;
        vault.get_data_as_string(&record, key)
    }

    /// Parse `text` as the type of `key` and store it
    ///
    /// # Errors
    ///
    /// `WrongValue` if the text does not parse, plus the errors of
    /// [`set_data`](Self::set_data).
    pub fn set_data_from_string(&self, key: &str, text: &str) -> VaultResult<()> {
        let (vault, record) = self.live_target()?;
        let cell = vault.parse_cell(key, text)?;
        vault.set_cell(&record, key, cell)
    }

    /// Keys of the owning vault, in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.target()
            .map(|(vault, _)| vault.keys())
            .unwrap_or_default()
    }

    /// Id of the record, if the handle is valid
    pub fn record_id(&self) -> Option<RecordId> {
        self.target().map(|(_, r)| r.id())
    }

    /// Unique id of the record as text, `"null"` for an invalid handle
    pub fn record_unique_id(&self) -> String {
        self.record_id()
            .map_or_else(|| "null".to_string(), |id| id.to_string())
    }

    /// Detach the handle from its record
    pub fn reset(&self) {
        *self.target.lock() = RefTarget::default();
    }

    /// Point this handle at the target of `other`
    pub fn assign(&self, other: &VaultRecordRef) {
        if std::ptr::eq(self, other) {
            return;
        }
        let copied = other.snapshot();
        *self.target.lock() = copied;
    }

    /// Copy of the target, re-validated under the record lock
    fn snapshot(&self) -> RefTarget {
        let t = self.target.lock();
        if t.is_valid() {
            t.clone()
        } else {
            RefTarget::default()
        }
    }
}

impl Clone for VaultRecordRef {
    fn clone(&self) -> Self {
        VaultRecordRef {
            target: Mutex::new(self.snapshot()),
        }
    }
}

impl PartialEq for VaultRecordRef {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let a = self.snapshot();
        let b = other.snapshot();
        match (&a.record, &b.record) {
            (Some(x), Some(y)) => x.id() == y.id(),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for VaultRecordRef {}

impl fmt::Debug for VaultRecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultRecordRef")
            .field("record", &self.record_unique_id())
            .field("valid", &self.is_valid())
            .finish()
    }
}
