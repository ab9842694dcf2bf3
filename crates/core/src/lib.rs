//! Core types for the vault store
//!
//! This crate defines the foundational types shared by every layer:
//! - TypedCell: type-erased value holder behind every column
//! - TypeTag: runtime type identity of a column
//! - KeyValue: bound for column types (hashing, ordering, string hooks)
//! - Float32 / Float64: totally ordered floating-point column types
//! - RecordId / SetId / VaultId: identifiers
//! - VaultError / ResultCode: the uniform error channel

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cell;
pub mod error;
pub mod float;
pub mod id;

pub use cell::{KeyValue, TypeTag, TypedCell};
pub use error::{ResultCode, VaultError, VaultResult};
pub use float::{Float32, Float64};
pub use id::{RecordId, SetId, VaultId};
