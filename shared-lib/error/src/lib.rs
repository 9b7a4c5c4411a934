//! Common error types for the booking data-access layer.
//!
//! This crate provides the configuration and database errors shared by the
//! connection layer and the booking service, plus the response shape used
//! when an error is reported to a client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors. These are fatal at startup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Database-related errors.
///
/// Cloneable so a single failed connection attempt can be handed to every
/// caller that was waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Record not found")]
    NotFound,

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),
}

impl DatabaseError {
    /// Whether issuing the same operation again may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_) | Self::QueryFailed(_))
    }
}

/// Error response for API clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Add details to the error response.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl From<&ConfigError> for ErrorResponse {
    fn from(err: &ConfigError) -> Self {
        Self::new("CONFIG_INVALID", "Invalid configuration").with_details(err.to_string())
    }
}

impl From<&DatabaseError> for ErrorResponse {
    fn from(err: &DatabaseError) -> Self {
        let (code, message) = match err {
            DatabaseError::ConnectionFailed(_) => ("DB_CONNECTION_FAILED", "Database connection failed"),
            DatabaseError::QueryFailed(_) => ("DB_QUERY_FAILED", "Database query failed"),
            DatabaseError::NotFound => ("DB_NOT_FOUND", "Record not found"),
            DatabaseError::DuplicateEntry(_) => ("DB_DUPLICATE_ENTRY", "Duplicate entry"),
        };
        Self::new(code, message)
    }
}
