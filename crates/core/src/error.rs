//! Error types for vault operations
//!
//! Every fallible call returns [`VaultResult`]. The error carries the key
//! the call was about and, for type mismatches, both the requested and the
//! stored [`TypeTag`]. [`ResultCode`] is the flat classification of an
//! outcome, including the `Success` and `Idle` states.

use crate::cell::TypeTag;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Flat classification of an operation outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResultCode {
    /// No operation has produced a result yet
    #[default]
    Idle,
    /// The operation succeeded
    Success,
    /// The key does not exist
    WrongKey,
    /// The requested type differs from the stored type
    WrongType,
    /// No record holds the requested value
    WrongValue,
    /// The key is unique and has no shared default value
    UniqueKey,
    /// A unique key value is already held by another record
    UniqueKeyValueAlreadyInSet,
    /// The key already exists
    DuplicateKey,
    /// The record is no longer valid
    DataRecordNotValid,
    /// The parent vault is not valid
    ParentVaultNotValid,
    /// The other set's parent vault is not valid
    OtherParentVaultNotValid,
    /// Two sets do not share a parent vault
    ParentVaultNotMatch,
    /// An operation was given the same record set twice
    SameVaultRecordSet,
    /// The record is already a member of the set
    RecordAlreadyInSet,
    /// A unique key was added to a non-empty vault without a generator
    TryToAddUniqueKeyInNonEmptyVaultWithoutLambda,
    /// Unique keys cannot be updated
    TryToUpdateUniqueKey,
}

impl ResultCode {
    /// Classify a result
    pub fn of<T>(result: &VaultResult<T>) -> ResultCode {
        match result {
            Ok(_) => ResultCode::Success,
            Err(e) => e.code(),
        }
    }

    /// Whether this code reports success
    pub fn is_success(&self) -> bool {
        matches!(self, ResultCode::Success)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Error returned by vault operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// The key does not exist
    #[error("key '{key}' does not exist")]
    WrongKey {
        /// Key name
        key: String,
    },

    /// The requested type differs from the stored type
    #[error("key '{key}' stores {saved}, requested {requested}")]
    WrongType {
        /// Key name
        key: String,
        /// Type the caller asked for
        requested: TypeTag,
        /// Type the key holds
        saved: TypeTag,
    },

    /// No record holds the requested value
    #[error("no record holds the requested value of key '{key}'")]
    WrongValue {
        /// Key name
        key: String,
    },

    /// The key is unique, so it has no shared default value
    #[error("key '{key}' is unique")]
    UniqueKey {
        /// Key name
        key: String,
    },

    /// A unique key value is already held by another record
    #[error("value of unique key '{key}' is already in use")]
    UniqueKeyValueAlreadyInSet {
        /// Key name
        key: String,
    },

    /// The key already exists
    #[error("key '{key}' already exists")]
    DuplicateKey {
        /// Key name
        key: String,
    },

    /// The record was erased or its vault dropped
    #[error("record is not valid")]
    DataRecordNotValid,

    /// The set has no valid parent vault
    #[error("parent vault is not valid")]
    ParentVaultNotValid,

    /// The other set has no valid parent vault
    #[error("parent vault of the other set is not valid")]
    OtherParentVaultNotValid,

    /// Two sets or a set and a record come from different vaults
    #[error("parent vaults do not match")]
    ParentVaultNotMatch,

    /// The same record set was passed twice
    #[error("operation requires two distinct record sets")]
    SameVaultRecordSet,

    /// The record is already a member of the set
    #[error("record is already in the set")]
    RecordAlreadyInSet,

    /// A unique key was added to a non-empty vault without a generator
    #[error("unique key '{key}' added to a non-empty vault without a value generator")]
    TryToAddUniqueKeyInNonEmptyVaultWithoutLambda {
        /// Key name
        key: String,
    },

    /// Unique keys cannot have their default updated
    #[error("unique key '{key}' cannot be updated")]
    TryToUpdateUniqueKey {
        /// Key name
        key: String,
    },
}

impl VaultError {
    /// Build a `WrongKey` error
    pub fn wrong_key(key: impl Into<String>) -> Self {
        VaultError::WrongKey { key: key.into() }
    }

    /// Build a `WrongType` error
    pub fn wrong_type(key: impl Into<String>, requested: TypeTag, saved: TypeTag) -> Self {
        VaultError::WrongType {
            key: key.into(),
            requested,
            saved,
        }
    }

    /// Flat result code of this error
    pub fn code(&self) -> ResultCode {
        match self {
            VaultError::WrongKey { .. } => ResultCode::WrongKey,
            VaultError::WrongType { .. } => ResultCode::WrongType,
            VaultError::WrongValue { .. } => ResultCode::WrongValue,
            VaultError::UniqueKey { .. } => ResultCode::UniqueKey,
            VaultError::UniqueKeyValueAlreadyInSet { .. } => ResultCode::UniqueKeyValueAlreadyInSet,
            VaultError::DuplicateKey { .. } => ResultCode::DuplicateKey,
            VaultError::DataRecordNotValid => ResultCode::DataRecordNotValid,
            VaultError::ParentVaultNotValid => ResultCode::ParentVaultNotValid,
            VaultError::OtherParentVaultNotValid => ResultCode::OtherParentVaultNotValid,
            VaultError::ParentVaultNotMatch => ResultCode::ParentVaultNotMatch,
            VaultError::SameVaultRecordSet => ResultCode::SameVaultRecordSet,
            VaultError::RecordAlreadyInSet => ResultCode::RecordAlreadyInSet,
            VaultError::TryToAddUniqueKeyInNonEmptyVaultWithoutLambda { .. } => {
                ResultCode::TryToAddUniqueKeyInNonEmptyVaultWithoutLambda
            }
            VaultError::TryToUpdateUniqueKey { .. } => ResultCode::TryToUpdateUniqueKey,
        }
    }

    /// Key the failed operation was about, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            VaultError::WrongKey { key }
            | VaultError::WrongType { key, .. }
            | VaultError::WrongValue { key }
            | VaultError::UniqueKey { key }
            | VaultError::UniqueKeyValueAlreadyInSet { key }
            | VaultError::DuplicateKey { key }
            | VaultError::TryToAddUniqueKeyInNonEmptyVaultWithoutLambda { key }
            | VaultError::TryToUpdateUniqueKey { key } => Some(key),
            _ => None,
        }
    }

    /// Type the caller asked for (type mismatches only)
    pub fn requested_type(&self) -> Option<TypeTag> {
        match self {
            VaultError::WrongType { requested, .. } => Some(*requested),
            _ => None,
        }
    }

    /// Type the key holds (type mismatches only)
    pub fn saved_type(&self) -> Option<TypeTag> {
        match self {
            VaultError::WrongType { saved, .. } => Some(*saved),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_of_result() {
        let ok: VaultResult<()> = Ok(());
        assert_eq!(ResultCode::of(&ok), ResultCode::Success);
        assert!(ResultCode::of(&ok).is_success());

        let err: VaultResult<()> = Err(VaultError::wrong_key("A"));
        assert_eq!(ResultCode::of(&err), ResultCode::WrongKey);
        assert_eq!(ResultCode::default(), ResultCode::Idle);
    }

    #[test]
    fn test_wrong_type_carries_tags() {
        let err = VaultError::wrong_type("A", TypeTag::of::<String>(), TypeTag::of::<i32>());
        assert_eq!(err.code(), ResultCode::WrongType);
        assert_eq!(err.key(), Some("A"));
        assert_eq!(err.requested_type(), Some(TypeTag::of::<String>()));
        assert_eq!(err.saved_type(), Some(TypeTag::of::<i32>()));
        assert!(err.to_string().contains("key 'A' stores i32"));
    }

    #[test]
    fn test_relationship_errors_have_no_key() {
        for err in [
            VaultError::DataRecordNotValid,
            VaultError::ParentVaultNotValid,
            VaultError::OtherParentVaultNotValid,
            VaultError::ParentVaultNotMatch,
            VaultError::SameVaultRecordSet,
            VaultError::RecordAlreadyInSet,
        ] {
            assert_eq!(err.key(), None);
            assert_eq!(err.requested_type(), None);
        }
    }

    #[test]
    fn test_result_code_serde() {
        let code = ResultCode::UniqueKeyValueAlreadyInSet;
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"UniqueKeyValueAlreadyInSet\"");
        let back: ResultCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, code);
    }
}
