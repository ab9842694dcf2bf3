//! Public types for the vault store.
//!
//! This module re-exports types from internal crates with a clean public interface.

// ============================================================================
// Public API types - these are what users should use
// ============================================================================

// Engine objects
pub use vault_engine::{Vault, VaultRecordRef, VaultRecordSet};

// Requests and set algebra
pub use vault_engine::{intersection, union, Predicate, Request};

// Configuration
pub use vault_engine::VaultOptions;

// Cell and column types
pub use vault_core::{Float32, Float64, KeyValue, TypeTag, TypedCell};

// Identifiers
pub use vault_core::{RecordId, VaultId};

// Error channel
pub use vault_core::{ResultCode, VaultError, VaultResult};

// ============================================================================
// Building blocks - for callers that embed the layers directly
// ============================================================================

// Lock guarding every vault and record set
pub use vault_concurrency::RecursiveRwLock;

// Per-key index behind every column
pub use vault_storage::KeyIndex;
