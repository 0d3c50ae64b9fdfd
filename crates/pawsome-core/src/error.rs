//! Error types for pawsome-core

use std::fmt;

use thiserror::Error;

/// Result type alias using pawsome-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pawsome-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Input fields failed validation; never retried
    #[error("Invalid post: {0}")]
    Validation(ValidationError),

    /// Transient connectivity failure talking to the cloud store
    #[error("Network error: {0}")]
    Network(String),

    /// The cloud store refused the request (permission or schema)
    #[error("Rejected by remote store: {0}")]
    RemoteRejected(String),

    /// Media upload failed
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Local storage failure
    #[error("Local storage error: {0}")]
    Persistence(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation was cancelled before it was submitted
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid or incomplete configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the failed step may be retried by the caller.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Upload(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(error: rusqlite::Error) -> Self {
        Self::Persistence(error.to_string())
    }
}

impl From<ValidationError> for Error {
    fn from(error: ValidationError) -> Self {
        Self::Validation(error)
    }
}

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub reason: &'static str,
}

/// Every field that failed validation for one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub(crate) fn push(&mut self, field: &'static str, reason: &'static str) {
        self.violations.push(FieldViolation { field, reason });
    }

    pub(crate) fn into_result(self) -> std::result::Result<(), Self> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    #[must_use]
    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    /// Names of the offending fields, in check order.
    #[must_use]
    pub fn fields(&self) -> Vec<&'static str> {
        self.violations.iter().map(|v| v.field).collect()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .violations
            .iter()
            .map(|v| format!("{} {}", v.field, v.reason))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&rendered)
    }
}

impl std::error::Error for ValidationError {}
