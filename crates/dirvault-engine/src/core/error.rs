//! Engine error type.

use dirvault_directory::DirectoryError;
use thiserror::Error;

/// Main error type for engine operations.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Request failed validation; surfaced to the caller as a user error.
    #[error("{reason}")]
    Validation {
        /// What was wrong with the request
        reason: String,
    },

    /// A username is already owned by another role or library set.
    #[error("{reason}")]
    Conflict {
        /// The conflicting ownership
        reason: String,
    },

    /// A referenced record does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// The record kind (role, set, config, ...)
        kind: String,
        /// The record name
        name: String,
    },

    /// Connection-level directory failure.
    #[error("directory transport error: {reason}")]
    DirectoryTransport {
        /// The failure reason
        reason: String,
    },

    /// The directory server rejected the operation.
    #[error("directory protocol error: {reason}")]
    DirectoryProtocol {
        /// The failure reason
        reason: String,
    },

    /// Host storage operation failed.
    #[error("storage operation failed: {operation}: {reason}")]
    Storage {
        /// The storage operation
        operation: String,
        /// The failure reason
        reason: String,
    },

    /// A WAL entry could not be decoded.
    #[error("corrupt WAL entry {wal_id}: {reason}")]
    WalCorrupt {
        /// The WAL id
        wal_id: String,
        /// The decode failure
        reason: String,
    },

    /// The host cancelled the operation.
    #[error("operation cancelled: {operation}")]
    Cancelled {
        /// The cancelled operation
        operation: String,
    },

    /// Unrecoverable state requiring operator intervention.
    #[error("{reason}")]
    Fatal {
        /// The failure and the required remediation
        reason: String,
    },
}

impl EngineError {
    /// Create a new validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Create a new managed-username conflict error.
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    /// Create a new "not found" error.
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a new storage error.
    pub fn storage(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a new cancelled error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a new fatal error.
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }

    /// Create a new corrupt-WAL error.
    pub fn wal_corrupt(wal_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WalCorrupt {
            wal_id: wal_id.into(),
            reason: reason.into(),
        }
    }

    /// True for errors the caller caused; these map to a user-error
    /// response rather than a server error.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::Conflict { .. } | Self::NotFound { .. }
        )
    }

    /// True for transient failures worth a queue back-off and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DirectoryTransport { .. }
                | Self::DirectoryProtocol { .. }
                | Self::Storage { .. }
        )
    }

    /// Error category for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Conflict { .. } => "conflict",
            Self::NotFound { .. } => "not_found",
            Self::DirectoryTransport { .. } => "directory_transport",
            Self::DirectoryProtocol { .. } => "directory_protocol",
            Self::Storage { .. } => "storage",
            Self::WalCorrupt { .. } => "wal_corrupt",
            Self::Cancelled { .. } => "cancelled",
            Self::Fatal { .. } => "fatal",
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<DirectoryError> for EngineError {
    fn from(error: DirectoryError) -> Self {
        match error {
            DirectoryError::Transport(reason) => Self::DirectoryTransport { reason },
            DirectoryError::Protocol(reason) => Self::DirectoryProtocol { reason },
            DirectoryError::InvalidRequest(reason) => Self::Validation { reason },
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        Self::Storage {
            operation: "json".to_string(),
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_errors() {
        assert!(EngineError::validation("bad input").is_user_error());
        assert!(EngineError::conflict("already managed").is_user_error());
        assert!(EngineError::not_found("role", "x").is_user_error());
        assert!(!EngineError::storage("put", "io").is_user_error());
        assert!(!EngineError::fatal("broken").is_user_error());
    }

    #[test]
    fn test_retryable() {
        assert!(EngineError::storage("put", "io").is_retryable());
        assert!(
            EngineError::from(DirectoryError::Transport("refused".to_string())).is_retryable()
        );
        assert!(!EngineError::validation("bad").is_retryable());
        assert!(!EngineError::cancelled("rotate").is_retryable());
    }

    #[test]
    fn test_directory_error_mapping() {
        let err: EngineError = DirectoryError::Protocol("constraint violation".to_string()).into();
        assert_eq!(err.category(), "directory_protocol");

        let err: EngineError = DirectoryError::InvalidRequest("bad userattr".to_string()).into();
        assert!(err.is_user_error());
    }

    #[test]
    fn test_not_found_display() {
        let err = EngineError::not_found("static role", "hashicorp");
        assert_eq!(err.to_string(), "static role not found: hashicorp");
    }
}
