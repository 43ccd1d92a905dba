//! Query execution.
//!
//! [`QueryExecutor`] is the single entry point for running SQL against the engine:
//!
//! 1. The read-only classifier gates the query (unless writes are allowed)
//! 2. A pooled connection is checked out and the query submitted
//! 3. The result stream is drained into a buffered [`QueryResult`]
//!
//! Steps 2 and 3 share one deadline. When it elapses the in-flight future is dropped,
//! which discards the connection and cancels the remote query.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::pool::{ConnectionPool, PoolPolicy};
use super::{Connection, Connector, QueryResult, Row, RowCursor};
use crate::capability::validate_query;
use crate::config::Configuration;
use crate::error::{DriverError, GatewayError, Result};

/// Runs queries through a bounded connection pool under a deadline
pub struct QueryExecutor<C: Connector> {
    pool: ConnectionPool<C>,
    allow_write_queries: bool,
    query_timeout: Duration,
}

impl<C: Connector> QueryExecutor<C> {
    pub fn new(pool: ConnectionPool<C>, allow_write_queries: bool, query_timeout: Duration) -> Self {
        Self { pool, allow_write_queries, query_timeout }
    }

    /// Create an executor with the default pool policy and the configured gate and deadline
    pub fn from_config(connector: C, config: &Configuration) -> Self {
        Self::new(
            ConnectionPool::new(connector, PoolPolicy::default()),
            config.allow_write_queries,
            config.query_timeout,
        )
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    pub const fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    pub const fn allows_write_queries(&self) -> bool {
        self.allow_write_queries
    }

    /// Verify the engine is reachable by running a trivial query
    pub async fn ping(&self) -> Result<()> {
        self.execute("SELECT 1").await.map(|_| ())
    }

    /// Execute a query and buffer its full result
    ///
    /// # Errors
    /// - `SecurityRejected` when writes are disallowed and the query is not read-only.
    ///   Nothing is sent to the engine.
    /// - `Timeout` when checkout, submission and streaming together exceed the deadline
    /// - `ExecutionFailed` for any connection, engine, or stream failure
    pub async fn execute(&self, query: &str) -> Result<QueryResult> {
        if let Err(e) = validate_query(query, self.allow_write_queries) {
            warn!(query = %query, "Rejected non-read-only query");
            return Err(e);
        }

        let start = Instant::now();
        let mut result = tokio::time::timeout(self.query_timeout, self.run(query))
            .await
            .map_err(|_| {
                warn!(timeout = ?self.query_timeout, "Query exceeded deadline");
                GatewayError::Timeout(self.query_timeout)
            })?
            .map_err(GatewayError::execution_failed)?;

        result.execution_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(
            rows = result.len(),
            skipped = result.skipped_rows,
            execution_ms = result.execution_ms,
            "Query completed"
        );
        Ok(result)
    }

    async fn run(&self, query: &str) -> std::result::Result<QueryResult, DriverError> {
        let mut conn = self.pool.acquire().await?;
        let mut cursor = conn.query(query).await?;
        let columns = cursor.columns().await?;

        let mut rows = Vec::new();
        let mut skipped = 0;
        while let Some(raw) = cursor.next_row().await? {
            match Row::decode(&columns, raw) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    warn!("Skipping undecodable row: {e}");
                    skipped += 1;
                }
            }
        }

        drop(cursor);
        conn.release();
        Ok(QueryResult::new(columns, rows, skipped))
    }
}
