//! Engine layer for the vault store
//!
//! This crate implements the user-facing objects:
//! - Vault: schema, records and per-key indexes
//! - VaultRecordRef: shared handle to one record
//! - VaultRecordSet: live subset of a vault, kept in step by its parent
//! - Request: predicate tree evaluated against a vault or a record set
//!
//! All typed access routes through the owning vault, so a value written
//! through any handle is reflected in the vault's indexes and in every
//! record set holding the record.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod options;
pub mod record_ref;
pub mod record_set;
pub mod request;
pub mod vault;
mod view;

// Re-exports
pub use options::VaultOptions;
pub use record_ref::VaultRecordRef;
pub use record_set::{intersection, union, VaultRecordSet};
pub use request::{Predicate, Request};
pub use vault::Vault;

pub use vault_core::{Float32, Float64, KeyValue, RecordId, ResultCode, TypeTag, TypedCell, VaultError, VaultId, VaultResult};
