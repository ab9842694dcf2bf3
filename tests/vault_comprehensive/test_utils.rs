//! Shared fixtures for the comprehensive suite

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vaultdb::{KeyValue, TypedCell, Vault, VaultRecordRef, VaultRecordSet};

/// Vault with an `i32` key "A" and one record per value
pub fn vault_with(values: &[i32]) -> Vault {
    let vault = Vault::new();
    vault.add_key("A", 0i32).unwrap();
    for &v in values {
        vault.create_record([("A", TypedCell::of(v))]).unwrap();
    }
    vault
}

/// Values of `key` across `refs`, sorted
pub fn values_of<T: KeyValue>(refs: &[VaultRecordRef], key: &str) -> Vec<T> {
    let mut out: Vec<T> = refs.iter().map(|r| r.get_data::<T>(key).unwrap()).collect();
    out.sort();
    out
}

/// Values of "A" across a set's members, sorted
pub fn set_values(set: &VaultRecordSet) -> Vec<i32> {
    values_of(&set.records(), "A")
}

/// Resource-like column value whose release is counted
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Handle(pub u32);

impl KeyValue for Handle {}

/// Counter shared with a cell destructor
pub fn release_counter() -> (Arc<AtomicUsize>, impl Fn(&mut Handle) + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    (count, move |_: &mut Handle| {
        c.fetch_add(1, Ordering::SeqCst);
    })
}
