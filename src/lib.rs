//! Trino Gateway - Agent-Facing Query Gateway for Trino
//!
//! The gateway exposes a Trino cluster to AI agents through a small, safe surface:
//! ad-hoc SQL behind a read-only classifier, plus catalog/schema/table discovery.
//!
//! # Core Principles
//! - Read-only by default (writes require `TRINO_ALLOW_WRITE_QUERIES=true`)
//! - Bounded resources: a fixed-size connection pool and a per-query deadline
//! - JSON-only output on stdout, logs on stderr
//!
//! # Module Organization
//! - [`error`] - Error types and stable error codes
//! - [`output`] - JSON output envelope types
//! - [`engine`] - Connector seam, connection pool, executor, Trino driver
//! - [`capability`] - Read-only query classification
//! - [`config`] - Environment configuration and connection descriptors
//! - [`introspect`] - Identifier resolution and metadata discovery
//! - [`mcp`] - MCP server (manual JSON-RPC 2.0 over stdio)
//! - [`logging`] - Tracing subscriber setup

pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod introspect;
pub mod logging;
pub mod mcp;
pub mod output;

pub use capability::{is_read_only, validate_query};
pub use config::{build_descriptor, AuthMode, Configuration};
pub use engine::trino::TrinoConnector;
pub use engine::{
    ColumnInfo, Connection, ConnectionPool, Connector, PoolPolicy, QueryExecutor, QueryResult, RawRow, Row,
    RowCursor, Timestamp, Value,
};
pub use error::{DecodeError, DriverError, GatewayError, Result};
pub use introspect::{IdentifierResolver, Introspector, QualifiedTable};
pub use mcp::McpServer;
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
