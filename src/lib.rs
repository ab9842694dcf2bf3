//! Embedded, in-process typed table store
//!
//! Records hold named columns of any [`KeyValue`] type. Every column is
//! indexed for O(1) equality and O(log n) range lookup, queries are built
//! as predicate trees, and their results are live [`VaultRecordSet`]s that
//! follow every later change to the vault.
//!
//! # Example
//!
//! ```ignore
//! use vaultdb::{Request, TypedCell, Vault, VaultRecordSet};
//!
//! let vault = Vault::new();
//! vault.add_key("age", 0u32)?;
//! vault.add_key("city", String::new())?;
//! vault.create_record([("age", TypedCell::of(34u32)), ("city", "Oslo".into())])?;
//!
//! let out = VaultRecordSet::new();
//! vault.request(&(Request::greater("age", 30u32) & Request::equal("city", String::from("Oslo"))), &out)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod types;

pub use types::*;
