//! Tier 4: Locking and Concurrency
//!
//! - The recursive lock nests reads and writes on one thread
//! - Writers are serialized with readers of the same key
//! - Mixed vault, handle and set traffic from many threads stays consistent

use crate::test_utils::*;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::thread;
use vaultdb::{RecursiveRwLock, Request, TypedCell, VaultRecordSet};

#[test]
fn tier4_lock_nests_on_one_thread() {
    let lock = RecursiveRwLock::new();
    {
        let _w = lock.write();
        let _r = lock.read();
        let _w2 = lock.write();
        assert!(lock.is_write_locked_by_current_thread());
    }
    assert!(!lock.is_held_by_current_thread());

    let _r = lock.read();
    {
        let _w = lock.write();
        assert!(lock.is_write_locked_by_current_thread());
    }
    assert!(lock.is_held_by_current_thread());
    assert!(!lock.is_write_locked_by_current_thread());
}

#[test]
fn tier4_sort_visitor_may_write() {
    let vault = vault_with(&[3, 1, 2]);
    vault
        .sort_by(
            "A",
            |r| {
                let v = r.get_data::<i32>("A").unwrap();
                r.set_data("A", v + 100).unwrap();
                true
            },
            false,
            None,
        )
        .unwrap();
    assert_eq!(values_of::<i32>(&vault.records(), "A"), vec![101, 102, 103]);
}

#[test]
fn tier4_mixed_traffic_stays_consistent() {
    let vault = Arc::new(vault_with(&(0..50).collect::<Vec<_>>()));
    let watched = Arc::new(VaultRecordSet::new());
    vault.request_greater_or_equal("A", 0, &watched).unwrap();
    let errors = Arc::new(Mutex::new(Vec::new()));

    let workers: Vec<_> = (0..6i32)
        .map(|t| {
            let vault = Arc::clone(&vault);
            let watched = Arc::clone(&watched);
            let errors = Arc::clone(&errors);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for i in 0..200i32 {
                    match rng.gen_range(0..4) {
                        0 => {
                            let v = 1000 * (t + 1) + i;
                            if let Err(e) = vault.create_record([("A", TypedCell::of(v))]) {
                                errors.lock().push(e);
                            }
                        }
                        1 => {
                            let all = vault.records();
                            if let Some(r) = all.get(rng.gen_range(0..all.len().max(1))) {
                                // A concurrent erase may win the race.
                                let _ = r.set_data("A", rng.gen_range(-50..50i32));
                            }
                        }
                        2 => {
                            let out = VaultRecordSet::new();
                            let req = Request::greater("A", -10) & Request::less("A", 10);
                            if let Err(e) = watched.request(&req, &out) {
                                errors.lock().push(e);
                            }
                            assert!(out.is_parent_vault_valid());
                        }
                        _ => {
                            let v = rng.gen_range(-50..50i32);
                            let _ = vault.erase_records("A", v, Some(1));
                        }
                    }
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    assert!(errors.lock().is_empty());

    // Every index still agrees with a scan.
    let sorted = vault.get_sorted_records("A", false, None).unwrap();
    assert_eq!(sorted.len(), vault.size());
    let walked: Vec<i32> = sorted.iter().map(|r| r.get_data::<i32>("A").unwrap()).collect();
    let mut scanned = values_of::<i32>(&vault.records(), "A");
    scanned.sort();
    assert_eq!(walked, scanned);

    for r in watched.records() {
        assert!(r.is_valid());
        let v = r.get_data::<i32>("A").unwrap();
        assert!(watched.get_records("A", v, None).unwrap().contains(&r));
    }
}
