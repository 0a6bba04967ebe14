use thiserror::Error;

/// Errors that can occur during repository operations.
///
/// Absent items and lost conditional writes are not errors: they surface as
/// `Option::None` and [`WriteOutcome::ConditionFailed`](super::WriteOutcome)
/// respectively.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },
    #[error("{entity_type} already exists: {id}")]
    AlreadyExists {
        entity_type: &'static str,
        id: String,
    },
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Transient storage error: {0}")]
    Transient(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Malformed blob {key}: {reason}")]
    MalformedBlob { key: String, reason: String },
    #[error("Batch write left {unprocessed} of {total} requests unprocessed")]
    PartialBatch { unprocessed: usize, total: usize },
}

impl RepositoryError {
    /// Returns true for timeouts, throttling and service-side 5xx failures.
    ///
    /// These are the only errors the shell retries, and only once.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Transient(_))
    }

    pub fn serialization(err: impl std::fmt::Display) -> Self {
        RepositoryError::Serialization(err.to_string())
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        RepositoryError::InvalidData(msg.into())
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
