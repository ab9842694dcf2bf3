//! Tier 1: Cell Invariants
//!
//! - A mismatched typed read fails without touching its output
//! - Destructors run once per stored copy, when the copy is released
//! - Every error carries its code, key and type tags

use crate::test_utils::*;
use std::sync::atomic::Ordering;
use vaultdb::{ResultCode, TypeTag, TypedCell, VaultError};

#[test]
fn tier1_mismatched_read_leaves_output() {
    let cell = TypedCell::of(17u16);
    let mut out = String::from("untouched");
    assert!(!cell.get(&mut out));
    assert_eq!(out, "untouched");

    let mut n = 0u16;
    assert!(cell.get(&mut n));
    assert_eq!(n, 17);
    assert_eq!(cell.type_tag(), TypeTag::of::<u16>());
}

#[test]
fn tier1_overwritten_cell_is_released_once() {
    let vault = vaultdb::Vault::new();
    vault.add_key("h", Handle(0)).unwrap();
    let r = vault.create_empty_record().unwrap();
    let (released, destructor) = release_counter();

    r.set_data_many([("h", TypedCell::with_destructor(Handle(1), destructor))])
        .unwrap();
    assert_eq!(released.load(Ordering::SeqCst), 0);

    r.set_data("h", Handle(2)).unwrap();
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert_eq!(r.get_data::<Handle>("h").unwrap(), Handle(2));
}

#[test]
fn tier1_erased_cell_is_released_with_last_handle() {
    let vault = vaultdb::Vault::new();
    vault.add_key("h", Handle(0)).unwrap();
    let r = vault.create_empty_record().unwrap();
    let (released, destructor) = release_counter();
    r.set_data_many([("h", TypedCell::with_destructor(Handle(3), destructor))])
        .unwrap();

    assert!(vault.erase_record(&r));
    assert_eq!(released.load(Ordering::SeqCst), 0);
    drop(r);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn tier1_error_channel_fields() {
    let vault = vault_with(&[1]);
    let r = vault.get_record("A", 1).unwrap();

    let err = r.get_data::<String>("A").unwrap_err();
    assert_eq!(err.code(), ResultCode::WrongType);
    assert_eq!(err.key(), Some("A"));
    assert_eq!(err.requested_type(), Some(TypeTag::of::<String>()));
    assert_eq!(err.saved_type(), Some(TypeTag::of::<i32>()));
    assert!(!err.code().is_success());

    let result = vault.get_record("A", 2);
    assert_eq!(ResultCode::of(&result), ResultCode::WrongValue);
    assert!(ResultCode::of(&vault.get_record("A", 1)).is_success());
    assert_eq!(ResultCode::default(), ResultCode::Idle);

    assert_eq!(VaultError::ParentVaultNotMatch.key(), None);
}
