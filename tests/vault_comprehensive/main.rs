//! Vault Comprehensive Test Suite
//!
//! This suite drives the public facade the way an embedding application
//! would, tier by tier.
//!
//! ## Test Tiers
//!
//! - **Tier 1**: Cell and error-channel invariants
//! - **Tier 2**: Index consistency under arbitrary mutation
//! - **Tier 3**: Record set propagation
//! - **Tier 4**: Lock behaviour and concurrent access
//! - **Tier 5**: Observable properties of the store as a whole
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test vault_comprehensive
//! ```

// Test modules
mod test_utils;

// Tier 1: Cell Invariants
mod tier1_cell_invariants;

// Tier 2: Index Consistency
mod tier2_index_consistency;

// Tier 3: Record Set Propagation
mod tier3_set_propagation;

// Tier 4: Locking and Concurrency
mod tier4_concurrency;

// Tier 5: Store Properties
mod tier5_store_properties;
