//! Tier 2: Index Consistency
//!
//! For every key and every live record, the hash index and the ordered
//! index both hold exactly one entry reflecting the record's current value.
//! Random create/set/erase sequences are checked against a plain model.

use crate::test_utils::*;
use proptest::prelude::*;
use vaultdb::{ResultCode, TypedCell, VaultRecordRef, VaultRecordSet};

#[derive(Debug, Clone)]
enum Op {
    Create(i32),
    Set(usize, i32),
    Erase(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (-10i32..10).prop_map(Op::Create),
        3 => (0usize..64, -10i32..10).prop_map(|(s, v)| Op::Set(s, v)),
        1 => (0usize..64).prop_map(Op::Erase),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    #[test]
    fn tier2_indexes_track_model(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let vault = vault_with(&[]);
        let mut model: Vec<(VaultRecordRef, i32)> = Vec::new();

        for op in ops {
            match op {
                Op::Create(v) => {
                    let r = vault.create_record([("A", TypedCell::of(v))]).unwrap();
                    model.push((r, v));
                }
                Op::Set(slot, v) if !model.is_empty() => {
                    let i = slot % model.len();
                    model[i].0.set_data("A", v).unwrap();
                    model[i].1 = v;
                }
                Op::Erase(slot) if !model.is_empty() => {
                    let (r, _) = model.remove(slot % model.len());
                    prop_assert!(vault.erase_record(&r));
                    prop_assert!(!r.is_valid());
                }
                _ => {}
            }
        }

        prop_assert_eq!(vault.size(), model.len());

        // Ordered index
        let mut expected: Vec<i32> = model.iter().map(|(_, v)| *v).collect();
        expected.sort();
        let sorted = vault.get_sorted_records("A", false, None).unwrap();
        let walked: Vec<i32> = sorted.iter().map(|r| r.get_data::<i32>("A").unwrap()).collect();
        prop_assert_eq!(&walked, &expected);

        // Hash index
        for v in -10i32..10 {
            let count = expected.iter().filter(|x| **x == v).count();
            let found = vault.get_records("A", v, None);
            if count == 0 {
                prop_assert_eq!(ResultCode::of(&found), ResultCode::WrongValue);
            } else {
                prop_assert_eq!(found.unwrap().len(), count);
            }
        }

        // Range requests agree with a scan
        let out = VaultRecordSet::new();
        vault.request_interval("A", -3, 4, true, false, &out).unwrap();
        let in_range: Vec<i32> = expected.iter().copied().filter(|v| (-3..4).contains(v)).collect();
        prop_assert_eq!(set_values(&out), in_range);
    }

    #[test]
    fn tier2_unique_values_stay_distinct(
        values in proptest::collection::vec(0u32..20, 1..40),
        rewrites in proptest::collection::vec((0usize..40, 0u32..20), 0..40),
    ) {
        let vault = vaultdb::Vault::new();
        vault.add_unique_key::<u32>("id").unwrap();
        let mut held = Vec::new();
        for v in values {
            match vault.create_record([("id", TypedCell::of(v))]) {
                Ok(r) => held.push(r),
                Err(e) => prop_assert_eq!(e.code(), ResultCode::UniqueKeyValueAlreadyInSet),
            }
        }
        for (slot, v) in rewrites {
            let r = &held[slot % held.len()];
            if let Err(e) = r.set_data("id", v) {
                prop_assert_eq!(e.code(), ResultCode::UniqueKeyValueAlreadyInSet);
            }
        }

        let mut ids = values_of::<u32>(&held, "id");
        let total = ids.len();
        ids.dedup();
        prop_assert_eq!(ids.len(), total);
        for id in ids {
            prop_assert_eq!(vault.get_records("id", id, None).unwrap().len(), 1);
        }
    }
}
