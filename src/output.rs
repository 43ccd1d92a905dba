//! JSON Output Envelope Types
//!
//! This module defines the structured JSON output format for all gateway operations.
//! All operations return either a SuccessEnvelope or an ErrorEnvelope.
//!
//! # Output Contract
//! - Success: `{"ok": true, "command": "...", "data": {...}, "meta": {...}}`
//! - Error: `{"ok": false, "command": "...", "error": {"code": "...", "message": "..."}}`
//!
//! The CLI prints one envelope per invocation. MCP tool results carry the same envelope
//! as their text content.

use serde::{Deserialize, Serialize};

use crate::engine::QueryResult;
use crate::error::GatewayError;

/// Success envelope for operation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Operation that produced the data (e.g. `execute_query`, `list_catalogs`)
    pub command: String,

    pub data: T,

    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(command: impl Into<String>, data: T, meta: Metadata) -> Self {
        Self { ok: true, command: command.into(), data, meta }
    }
}

impl SuccessEnvelope<QueryResult> {
    /// Wrap a query result, lifting its timing and row counts into the metadata
    pub fn from_result(command: impl Into<String>, result: QueryResult) -> Self {
        let meta = Metadata::for_result(&result);
        Self::new(command, result, meta)
    }
}

/// Error envelope for operation failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    /// Operation that was attempted
    pub command: String,

    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    pub fn new(command: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, command: command.into(), error }
    }

    /// Create error envelope from a gateway error
    pub fn from_error(command: impl Into<String>, err: &GatewayError) -> Self {
        Self::new(command, ErrorInfo::new(err.error_code(), err.message()))
    }
}

/// Error information structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g. `SECURITY_REJECTED`, `TIMEOUT`)
    pub code: String,

    /// Human-readable error message (no credentials)
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Execution time in milliseconds
    pub execution_ms: u64,

    /// Number of rows returned (query results only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_returned: Option<usize>,

    /// Number of rows dropped because they failed to decode (omitted when none were)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_skipped: Option<usize>,
}

impl Metadata {
    pub fn new(execution_ms: u64) -> Self {
        Self { execution_ms, ..Self::default() }
    }

    pub fn with_rows(execution_ms: u64, rows_returned: usize) -> Self {
        Self { execution_ms, rows_returned: Some(rows_returned), rows_skipped: None }
    }

    pub fn for_result(result: &QueryResult) -> Self {
        Self {
            execution_ms: result.execution_ms,
            rows_returned: Some(result.len()),
            rows_skipped: Some(result.skipped_rows).filter(|&n| n > 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ColumnInfo, Row, Value};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_success_envelope_serialization() {
        let envelope = SuccessEnvelope::new(
            "list_catalogs",
            serde_json::json!(["memory", "system"]),
            Metadata::new(42),
        );

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""ok":true"#));
        assert!(json.contains(r#""command":"list_catalogs""#));
        assert!(json.contains(r#""execution_ms":42"#));
        assert!(!json.contains("rows_returned"));
    }

    #[test]
    fn test_error_envelope_from_gateway_error() {
        let envelope = ErrorEnvelope::from_error("execute_query", &GatewayError::SecurityRejected);

        assert!(!envelope.ok);
        assert_eq!(envelope.command, "execute_query");
        assert_eq!(envelope.error.code, "SECURITY_REJECTED");
        assert!(envelope.error.message.contains("TRINO_ALLOW_WRITE_QUERIES"));
    }

    #[test]
    fn test_metadata_for_result() {
        let rows = vec![Row::from_iter([("n", Value::from(1))])];
        let mut result = QueryResult::new(vec![ColumnInfo::new("n", "integer")], rows, 0);
        result.execution_ms = 7;
        assert_eq!(Metadata::for_result(&result), Metadata::with_rows(7, 1));

        result.skipped_rows = 2;
        let meta = Metadata::for_result(&result);
        assert_eq!(meta.rows_skipped, Some(2));
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, r#"{"execution_ms":7,"rows_returned":1,"rows_skipped":2}"#);
    }

    #[test]
    fn test_from_result_wraps_data() {
        let result = QueryResult::new(vec![], vec![], 0);
        let envelope = SuccessEnvelope::from_result("get_table_schema", result);
        assert!(envelope.ok);
        assert_eq!(envelope.meta.rows_returned, Some(0));
    }
}
