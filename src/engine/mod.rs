//! Query Engine Abstractions and Core Types
//!
//! This module defines the seams between the gateway and the remote engine:
//!
//! - [`Connector`] opens live connections from a resolved descriptor
//! - [`Connection`] submits one statement and returns a [`RowCursor`]
//! - [`RowCursor`] yields the column list once, then raw rows until exhausted
//!
//! The [`pool::ConnectionPool`] owns connections produced by a `Connector`, and the
//! [`executor::QueryExecutor`] owns the pool. Tests substitute an in-memory connector.
//!
//! # Result Shape
//! A [`QueryResult`] is a fully buffered, ordered list of [`Row`]s. Each row maps column
//! name to a [`Value`] in column order.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::DriverError;

pub mod executor;
pub mod pool;
pub mod trino;
mod value;

pub use executor::QueryExecutor;
pub use pool::{ConnectionPool, PoolPolicy, PooledConnection};
pub use value::{Row, Timestamp, Value};

/// A row exactly as the engine sent it, one JSON value per column
pub type RawRow = Vec<serde_json::Value>;

/// Column metadata for a result set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,

    /// Engine type name (e.g. `varchar(25)`, `timestamp(3) with time zone`)
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self { name: name.into(), data_type: data_type.into() }
    }
}

/// Query execution result
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    /// Column metadata in result order
    pub columns: Vec<ColumnInfo>,

    /// Decoded rows
    pub rows: Vec<Row>,

    /// Rows dropped because they failed to decode
    ///
    /// When non-zero, `rows` undercounts the engine's result.
    #[serde(skip_serializing_if = "is_zero")]
    pub skipped_rows: usize,

    /// Wall-clock time for the whole call, pool checkout included
    pub execution_ms: u64,
}

impl QueryResult {
    /// Creates a result from decoded rows
    #[must_use]
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Row>, skipped_rows: usize) -> Self {
        Self { columns, rows, skipped_rows, execution_ms: 0 }
    }

    /// Collect the string values of one column, skipping rows where it is absent or not a string
    #[must_use]
    pub fn project(&self, column: &str) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column).and_then(Value::as_str).map(String::from))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Opens connections to the remote engine
///
/// Implementations must be cheap to share: the pool calls `connect` whenever it has no
/// reusable idle connection.
pub trait Connector: Send + Sync + 'static {
    /// Connection type produced by this connector
    type Connection: Connection;

    /// Open a new live connection
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, DriverError>> + Send;
}

/// A live connection that runs one statement at a time
pub trait Connection: Send + 'static {
    /// Cursor over the results of one statement
    type Cursor: RowCursor;

    /// Submit a statement and return a cursor over its results
    fn query(&mut self, sql: &str) -> impl Future<Output = Result<Self::Cursor, DriverError>> + Send;
}

/// Forward-only cursor over a statement's results
pub trait RowCursor: Send {
    /// Column list for the result (empty for statements without a result set)
    fn columns(&mut self) -> impl Future<Output = Result<Vec<ColumnInfo>, DriverError>> + Send;

    /// Next raw row, or `None` once the stream is exhausted
    ///
    /// An `Err` is a stream-level failure and ends the iteration.
    fn next_row(&mut self) -> impl Future<Output = Result<Option<RawRow>, DriverError>> + Send;
}
