//! Error Handling Infrastructure
//!
//! This module defines the error types used throughout the gateway.
//! All errors are structured and map to stable error codes for JSON output.
//!
//! # Error Categories
//! - `SecurityRejected`: Query blocked by the read-only classifier
//! - `ExecutionFailed`: Connection, driver, or result-stream failure (wraps [`DriverError`])
//! - `Timeout`: The per-query deadline elapsed
//! - `ConfigInvalid`: Startup configuration could not be turned into a connector
//! - `InvalidInput`: Malformed input or missing required parameters

use std::time::Duration;

use thiserror::Error;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Query rejected by the read-only classifier while writes are disallowed
    #[error(
        "Security restriction: only SELECT, SHOW, DESCRIBE, EXPLAIN and WITH queries are allowed. \
         Set TRINO_ALLOW_WRITE_QUERIES=true to enable write operations (at your own risk)"
    )]
    SecurityRejected,

    /// Remote engine or driver failure, surfaced with its underlying cause
    #[error("Query execution failed: {source}")]
    ExecutionFailed {
        #[source]
        source: DriverError,
    },

    /// Query deadline exceeded
    #[error("Query exceeded timeout of {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Invalid startup configuration
    #[error("Configuration invalid: {0}")]
    ConfigInvalid(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl GatewayError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling by agents.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::SecurityRejected => "SECURITY_REJECTED",
            Self::ExecutionFailed { .. } => "EXECUTION_FAILED",
            Self::Timeout(_) => "TIMEOUT",
            Self::ConfigInvalid(_) => "CONFIG_INVALID",
            Self::InvalidInput(_) => "INVALID_INPUT",
        }
    }

    /// Get human-readable error message (agent-appropriate, no credentials)
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create an execution failure from a driver error
    pub fn execution_failed(source: DriverError) -> Self {
        Self::ExecutionFailed { source }
    }

    /// Create a configuration error
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<DriverError> for GatewayError {
    fn from(source: DriverError) -> Self {
        Self::execution_failed(source)
    }
}

/// Errors raised by a connection or its result cursor
#[derive(Error, Debug)]
pub enum DriverError {
    /// HTTP transport failure (connect, TLS, read)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Engine answered with a non-success HTTP status
    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// Engine reported a query failure
    #[error("{name} ({code}): {message}")]
    Query { name: String, code: i64, message: String },

    /// Response could not be interpreted
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a remote query error
    pub fn query(name: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self::Query { name: name.into(), code, message: message.into() }
    }
}

/// A single row could not be decoded into typed values
///
/// Never propagated: the executor logs it and skips the row.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Row width differs from the column list
    #[error("row has {actual} values but result has {expected} columns")]
    Width { expected: usize, actual: usize },

    /// Value does not match its declared column type
    #[error("column '{column}' of type {data_type}: {reason}")]
    Value { column: String, data_type: String, reason: String },
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
