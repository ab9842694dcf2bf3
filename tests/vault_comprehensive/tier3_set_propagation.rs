//! Tier 3: Record Set Propagation
//!
//! Sets share rows with their vault. Schema changes, value changes and
//! erasures made through the vault or any handle reach every set, including
//! sets derived from other sets.

use crate::test_utils::*;
use vaultdb::{intersection, union, Request, ResultCode, TypedCell, Vault, VaultRecordSet};

#[test]
fn tier3_nested_sets_follow_value_changes() {
    let vault = vault_with(&[1, 2, 3, 4, 5, 6]);
    let evens = VaultRecordSet::new();
    let big_evens = VaultRecordSet::new();
    vault
        .request(&Request::greater("A", 0).filter(|r| r.get_data::<i32>("A").map_or(false, |v| v % 2 == 0)), &evens)
        .unwrap();
    evens.request_greater("A", 2, &big_evens).unwrap();
    assert_eq!(set_values(&evens), vec![2, 4, 6]);
    assert_eq!(set_values(&big_evens), vec![4, 6]);

    let r = big_evens.get_record("A", 6).unwrap();
    r.set_data("A", 60).unwrap();
    assert_eq!(evens.get_record("A", 60).unwrap(), r);
    assert_eq!(big_evens.get_record("A", 60).unwrap(), r);
    assert_eq!(
        big_evens.get_sorted_records("A", true, Some(1)).unwrap()[0],
        r
    );

    // Membership is fixed at request time, values are live.
    r.set_data("A", 1).unwrap();
    assert_eq!(set_values(&big_evens), vec![1, 4]);
}

#[test]
fn tier3_generated_unique_key_reaches_sets() {
    let vault = vault_with(&[10, 20, 30]);
    let set = VaultRecordSet::new();
    vault.request_greater("A", 10, &set).unwrap();

    vault
        .add_unique_key_with("rank", |i, _| i as u64)
        .unwrap();
    assert_eq!(set.unique_keys(), vec!["rank".to_string()]);
    assert_eq!(set.get_key_value::<u64>("rank").unwrap_err().code(), ResultCode::UniqueKey);
    let r = set.get_record("rank", 2u64).unwrap();
    assert_eq!(r.get_data::<i32>("A").unwrap(), 30);
    assert_eq!(
        set.get_record("rank", 0u64).unwrap_err().code(),
        ResultCode::WrongValue
    );
}

#[test]
fn tier3_erase_reaches_every_set() {
    let vault = vault_with(&[1, 2, 3]);
    let a = VaultRecordSet::new();
    let b = VaultRecordSet::new();
    vault.request_greater("A", 0, &a).unwrap();
    vault.request_less("A", 3, &b).unwrap();

    vault.erase_record_by("A", 2).unwrap();
    assert_eq!(set_values(&a), vec![1, 3]);
    assert_eq!(set_values(&b), vec![1]);
    assert_eq!(a.get_record("A", 2).unwrap_err().code(), ResultCode::WrongValue);
}

#[test]
fn tier3_set_algebra_results_stay_live() {
    let vault = vault_with(&[1, 2, 3, 4]);
    let low = VaultRecordSet::new();
    let high = VaultRecordSet::new();
    let both = VaultRecordSet::new();
    let either = VaultRecordSet::new();
    vault.request_less_or_equal("A", 3, &low).unwrap();
    vault.request_greater_or_equal("A", 2, &high).unwrap();

    intersection(&low, &high, &both).unwrap();
    union(&low, &high, &either).unwrap();
    assert_eq!(set_values(&both), vec![2, 3]);
    assert_eq!(set_values(&either), vec![1, 2, 3, 4]);

    vault.add_key("tag", String::from("none")).unwrap();
    let r = both.get_record("A", 3).unwrap();
    r.set_data("tag", String::from("hot")).unwrap();
    let hot = VaultRecordSet::new();
    either.request_equal("tag", String::from("hot"), &hot).unwrap();
    assert_eq!(set_values(&hot), vec![3]);
}

#[test]
fn tier3_rebinding_moves_set_between_vaults() {
    let first = vault_with(&[1, 2]);
    let second = vault_with(&[7]);
    let set = VaultRecordSet::new();

    first.request_greater("A", 0, &set).unwrap();
    assert_eq!(set.parent_vault_id(), Some(first.id()));

    second.request_greater("A", 0, &set).unwrap();
    assert_eq!(set.parent_vault_id(), Some(second.id()));
    assert_eq!(set_values(&set), vec![7]);

    // The first vault no longer feeds the set.
    first.get_record("A", 1).unwrap().set_data("A", 100).unwrap();
    first.drop_vault();
    assert!(set.is_parent_vault_valid());
    assert_eq!(set.size(), 1);
}

#[test]
fn tier3_add_records_builds_set_by_hand() {
    let vault = Vault::new();
    vault.add_key("name", String::new()).unwrap();
    let refs: Vec<_> = ["ann", "bob", "cy"]
        .iter()
        .map(|n| vault.create_record([("name", TypedCell::from(*n))]).unwrap())
        .collect();

    let seed = VaultRecordSet::new();
    vault
        .request_equal("name", String::from("ann"), &seed)
        .unwrap();
    seed.add_records(refs.iter().skip(1)).unwrap();
    assert_eq!(seed.size(), 3);
    assert_eq!(
        seed.add_records(refs.iter()).unwrap_err().code(),
        ResultCode::RecordAlreadyInSet
    );
    assert_eq!(
        values_of::<String>(&seed.records(), "name"),
        vec!["ann".to_string(), "bob".to_string(), "cy".to_string()]
    );
}
