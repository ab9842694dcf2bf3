//! Vault configuration

use serde::{Deserialize, Serialize};

/// Options for creating a vault.
///
/// Use the builder pattern to configure options:
///
/// ```ignore
/// use vault_engine::{Vault, VaultOptions};
///
/// let vault = Vault::with_options(VaultOptions::new().name("users").record_capacity(1024));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultOptions {
    /// Label attached to diagnostics emitted by this vault.
    pub name: Option<String>,
    /// Number of records to pre-allocate room for.
    pub record_capacity: usize,
}

impl VaultOptions {
    /// Create a new `VaultOptions` with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the vault name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the record capacity.
    pub fn record_capacity(mut self, capacity: usize) -> Self {
        self.record_capacity = capacity;
        self
    }
}
