//! Tier 5: Store Properties
//!
//! Whole-store observations: defaults flow from the schema into new
//! records, removing an absent key is inert, and erasure is visible from
//! the handle, the vault and every set at once.

use crate::test_utils::*;
use proptest::prelude::*;
use vaultdb::{ResultCode, TypedCell, Vault, VaultRecordSet};

#[test]
fn tier5_defaults_flow_into_new_records() {
    let vault = Vault::new();
    vault.add_key("A", 7i32).unwrap();
    vault.add_key("Name", String::from("unnamed")).unwrap();
    vault.add_key("Flag", true).unwrap();

    assert_eq!(vault.get_key_value::<i32>("A").unwrap(), 7);
    assert_eq!(vault.get_key_value::<String>("Name").unwrap(), "unnamed");

    let r = vault.create_empty_record().unwrap();
    assert_eq!(r.get_data::<i32>("A").unwrap(), 7);
    assert_eq!(r.get_data::<String>("Name").unwrap(), "unnamed");
    assert!(r.get_data::<bool>("Flag").unwrap());

    // A changed default applies only to records created afterwards.
    vault.update_key("A", 9i32).unwrap();
    let later = vault.create_record([("Name", TypedCell::from("b"))]).unwrap();
    assert_eq!(r.get_data::<i32>("A").unwrap(), 7);
    assert_eq!(later.get_data::<i32>("A").unwrap(), 9);
    assert_eq!(vault.get_records("A", 9, None).unwrap(), vec![later]);
}

#[test]
fn tier5_remove_absent_key_is_inert() {
    let vault = vault_with(&[1, 2]);
    vault.add_key("B", 0u8).unwrap();
    let before = vault.keys();

    assert!(!vault.remove_key("missing"));
    assert_eq!(vault.keys(), before);
    assert_eq!(vault.size(), 2);

    assert!(vault.remove_key("B"));
    assert!(!vault.remove_key("B"));
    assert_eq!(vault.keys(), vec!["A".to_string()]);
}

#[test]
fn tier5_schema_change_reaches_set_members() {
    let vault = vault_with(&[1, 2, 3]);
    let set = VaultRecordSet::new();
    vault.request_less("A", 3, &set).unwrap();

    vault.add_key("Z", String::from("zed")).unwrap();
    assert!(set.is_key_exist("Z"));
    assert_eq!(set.get_key_value::<String>("Z").unwrap(), "zed");
    for r in set.records() {
        assert_eq!(r.get_data::<String>("Z").unwrap(), "zed");
    }
    assert_eq!(set.get_records("Z", String::from("zed"), None).unwrap().len(), 2);

    vault.remove_key("Z");
    assert!(!set.is_key_exist("Z"));
    let r = set.get_record("A", 1).unwrap();
    assert_eq!(ResultCode::of(&r.get_data::<String>("Z")), ResultCode::WrongKey);
}

#[test]
fn tier5_dropped_data_leaves_schema() {
    let vault = vault_with(&[1, 2, 3]);
    let set = VaultRecordSet::new();
    vault.request_greater("A", 0, &set).unwrap();
    let held = vault.records();

    vault.drop_data();
    assert_eq!(vault.size(), 0);
    assert_eq!(vault.keys(), vec!["A".to_string()]);
    assert!(held.iter().all(|r| !r.is_valid()));
    assert_eq!(set.size(), 0);
    assert!(set.is_parent_vault_valid());

    vault.create_record([("A", TypedCell::of(4i32))]).unwrap();
    assert_eq!(set.size(), 0);
    assert_eq!(vault.size(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn tier5_erase_is_visible_everywhere(
        values in prop::collection::vec(-20i32..20, 1..30),
        pick in any::<prop::sample::Index>(),
    ) {
        let vault = vault_with(&values);
        let everything = VaultRecordSet::new();
        let nonneg = VaultRecordSet::new();
        vault.request_greater_or_equal("A", -20, &everything).unwrap();
        vault.request_greater_or_equal("A", 0, &nonneg).unwrap();

        let all = vault.records();
        let victim = pick.get(&all).clone();
        let value = victim.get_data::<i32>("A").unwrap();
        let was_nonneg = nonneg.check_record(&victim);
        prop_assert_eq!(was_nonneg, value >= 0);

        let size = vault.size();
        let nonneg_size = nonneg.size();
        prop_assert!(vault.erase_record(&victim));

        prop_assert!(!victim.is_valid());
        prop_assert_eq!(vault.size(), size - 1);
        prop_assert_eq!(everything.size(), size - 1);
        prop_assert!(!everything.check_record(&victim));
        prop_assert!(!nonneg.check_record(&victim));
        prop_assert_eq!(nonneg.size(), nonneg_size - usize::from(was_nonneg));
        prop_assert_eq!(ResultCode::of(&victim.get_data::<i32>("A")), ResultCode::DataRecordNotValid);

        // Erasing twice is a no-op.
        prop_assert!(!vault.erase_record(&victim));
        prop_assert_eq!(vault.size(), size - 1);
    }
}
