//! Storage layer for the vault store
//!
//! This crate provides the data structures behind a vault:
//! - VaultRecord: one shared row with liveness and a dependent-set registry
//! - KeyIndex: hash + ordered index of one key
//! - ErasedKeyIndex: the same index with its value type erased
//! - IndexedStore: schema, indexes and records, shared by vaults and sets

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod index;
pub mod record;
pub mod store;

pub use index::{Bucket, ErasedKeyIndex, KeyIndex};
pub use record::VaultRecord;
pub use store::IndexedStore;
