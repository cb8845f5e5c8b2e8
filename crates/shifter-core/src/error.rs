//! Error types for the Sacred Shifter state layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reported by the authentication capability of the backend.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthError {
    /// Email/password pair was rejected.
    #[error("Invalid login credentials")]
    CredentialsRejected,

    /// An account already exists for this email.
    #[error("User already registered: {0}")]
    AlreadyRegistered(String),

    /// The session is no longer valid and must be re-established.
    #[error("Session expired")]
    SessionExpired,

    /// Transport-level failure talking to the backend.
    #[error("Auth network error: {0}")]
    Network(String),

    /// Any other rejection reported by the backend.
    #[error("Auth request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Failures reported by the row-storage capability of the backend.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageError {
    #[error("Record not found: {table} '{id}'")]
    NotFound { table: String, id: String },

    /// A record with the same id already exists.
    #[error("Record already exists: {table} '{id}'")]
    Conflict { table: String, id: String },

    #[error("Storage network error: {0}")]
    Network(String),

    /// The backend returned a record this layer cannot interpret.
    #[error("Malformed record: {0}")]
    Malformed(String),
}

impl StorageError {
    pub fn not_found(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
            id: id.into(),
        }
    }

    pub fn conflict(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Conflict {
            table: table.into(),
            id: id.into(),
        }
    }
}

/// A shared error type for the whole state layer.
///
/// Remote failures are wrapped (`Auth`, `Storage`); local precondition
/// violations (`InvalidAmount`, `InvalidEnergyType`, `NotAuthenticated`,
/// `InvalidInput`) are raised by the stores before any remote call.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShifterError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Score deltas must be strictly positive.
    #[error("Invalid progression amount: {0} (must be > 0)")]
    InvalidAmount(i64),

    #[error("Invalid energy type: '{0}'")]
    InvalidEnergyType(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    /// Caller supplied input that fails a local check (e.g. empty email).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {message}")]
    Io { message: String },

    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShifterError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, Self::NotAuthenticated)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(StorageError::NotFound { .. }))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Storage(StorageError::Conflict { .. }))
    }

    /// Returns true for failures raised locally, before touching the backend.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount(_)
                | Self::InvalidEnergyType(_)
                | Self::NotAuthenticated
                | Self::InvalidInput(_)
        )
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for ShifterError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for ShifterError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for ShifterError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for ShifterError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, ShifterError>`.
pub type Result<T> = std::result::Result<T, ShifterError>;
