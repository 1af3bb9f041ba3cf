//! Error types for gridbase operations

use thiserror::Error;
use uuid::Uuid;

/// Validation errors: missing or invalid grid, column, row or payload field.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No {field} provided")]
    RequiredFieldMissing { field: String },

    #[error("Grid {grid_uuid} not found")]
    GridNotFound { grid_uuid: Uuid },

    #[error("Column {column_uuid} not found in grid {grid_uuid}")]
    ColumnNotFound { grid_uuid: Uuid, column_uuid: Uuid },

    #[error("Row {row_uuid} not found in grid {grid_uuid}")]
    RowNotFound { grid_uuid: Uuid, row_uuid: Uuid },

    #[error("Row {row_uuid} already exists in grid {grid_uuid}")]
    RowAlreadyExists { grid_uuid: Uuid, row_uuid: Uuid },

    #[error("Column {column_uuid} is a reference column, not supported for update")]
    ReferenceColumnNotUpdatable { column_uuid: Uuid },

    #[error("Column {column_uuid} is not a reference column")]
    NotAReferenceColumn { column_uuid: Uuid },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        ValidationError::RequiredFieldMissing {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Persistence backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Connection unavailable: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Cannot decode field {field}: {reason}")]
    DecodeFailed { field: usize, reason: String },
}

/// Token validation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("No JWT provided")]
    MissingToken,

    #[error("Token expired")]
    Expired,

    #[error("Invalid JWT: {reason}")]
    Invalid { reason: String },

    #[error("Invalid username or passphrase")]
    InvalidCredentials,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Secret not found: set {env_var} or provide {file_path}")]
    MissingSecret { env_var: String, file_path: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Message transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Broker unreachable at {address}: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("Transport channel closed")]
    Closed,

    #[error("Connection loop interrupted")]
    Interrupted,

    #[error("Publish failed: {reason}")]
    PublishFailed { reason: String },
}

/// Master error type for all gridbase errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type alias for gridbase operations.
pub type GridResult<T> = Result<T, GridError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::missing("row UUID");
        assert_eq!(err.to_string(), "No row UUID provided");

        let err = ValidationError::ReferenceColumnNotUpdatable {
            column_uuid: Uuid::nil(),
        };
        assert!(err.to_string().contains("reference column"));
    }

    #[test]
    fn test_grid_error_from_conversions() {
        let err: GridError = StorageError::QueryFailed {
            reason: "relation \"rows\" does not exist".to_string(),
        }
        .into();
        assert!(matches!(err, GridError::Storage(_)));
        assert!(err.to_string().starts_with("Storage error"));

        let err: GridError = AuthError::Expired.into();
        assert_eq!(err.to_string(), "Authentication error: Token expired");
    }
}
