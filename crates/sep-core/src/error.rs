//! Common error types for resource stores

use thiserror::Error;

use crate::href::HrefError;
use crate::identity::IdentityError;
use crate::models::ResourceKind;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or mutating the resource model
#[derive(Debug, Error)]
pub enum StoreError {
    /// Index, child list, href or mRID absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Children under one (parent, name) pair must share a single kind
    #[error("Type conflict under '{name}': expected {expected}, got {found}")]
    TypeConflict {
        /// Child list name (e.g. "derc")
        name: String,
        /// Kind of the children already stored
        expected: ResourceKind,
        /// Kind that was offered
        found: ResourceKind,
    },

    /// Item offered to a store declared for another kind
    #[error("Type mismatch: store holds {expected}, got {found}")]
    TypeMismatch {
        expected: ResourceKind,
        found: ResourceKind,
    },

    /// Href grammar violation
    #[error("Invalid href: {0}")]
    InvalidHref(#[from] HrefError),

    /// Malformed LFDI or fingerprint
    #[error("Invalid LFDI: {0}")]
    InvalidLfdi(#[from] IdentityError),

    /// Duplicate insertion where replacement is disallowed
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Request is well-formed but cannot be applied
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Point store I/O or snapshot encoding failure
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl StoreError {
    /// Returns the HTTP status code the protocol layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::NotFound(_) => 404,
            StoreError::TypeConflict { .. } => 409,
            StoreError::TypeMismatch { .. } => 409,
            StoreError::InvalidHref(_) => 400,
            StoreError::InvalidLfdi(_) => 400,
            StoreError::AlreadyExists(_) => 409,
            StoreError::InvalidRequest(_) => 400,
            StoreError::Persistence(_) => 500,
        }
    }

    /// Shorthand for the common "absent" case
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        StoreError::NotFound(what.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Persistence(e.to_string())
    }
}
