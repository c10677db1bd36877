use tabler_core::TablerError;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service-level errors with user-friendly messages
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Schema introspection not supported for this database")]
    SchemaNotSupported,

    #[error("Schema loading failed: {0}")]
    SchemaLoadFailed(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Unknown column or table: {0}")]
    InvalidIdentifier(String),

    #[error("A primary key or key column selection is required to {0}")]
    PrimaryKeyRequired(String),

    #[error("Validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    #[error("There are {0} unsaved changes; save or discard them first")]
    UnsavedChanges(usize),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Save failed, no changes were written: {0}")]
    SaveFailed(String),

    #[error("Table operation failed: {0}")]
    TableOperationFailed(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<TablerError> for ServiceError {
    fn from(err: TablerError) -> Self {
        match err {
            TablerError::Connection(msg) => ServiceError::ConnectionFailed(msg),
            TablerError::InvalidIdentifier(name) => ServiceError::InvalidIdentifier(name),
            TablerError::NotFound(name) => ServiceError::TableNotFound(name),
            TablerError::Cancelled => ServiceError::Cancelled,
            other => ServiceError::TableOperationFailed(other.to_string()),
        }
    }
}
