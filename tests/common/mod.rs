//! In-memory stand-in for a Trino cluster.
//!
//! `FakeTrino` answers statements from a table of scripted replies and records every
//! statement it receives, so tests can assert both results and the exact SQL sent.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value as Json};
use trino_gateway::{
    ColumnInfo, Configuration, Connection, Connector, DriverError, IdentifierResolver, QueryExecutor, RawRow,
    RowCursor,
};

/// Scripted engine reply for one statement
#[derive(Clone)]
pub enum Reply {
    Rows { columns: Vec<ColumnInfo>, rows: Vec<RawRow> },
    Fail { name: &'static str, message: String },
    Hang,
}

impl Reply {
    pub fn rows(columns: &[(&str, &str)], rows: Vec<RawRow>) -> Self {
        Self::Rows {
            columns: columns.iter().map(|(name, ty)| ColumnInfo::new(*name, *ty)).collect(),
            rows,
        }
    }

    pub fn names(column: &str, names: &[&str]) -> Self {
        Self::rows(&[(column, "varchar")], names.iter().map(|n| vec![json!(n)]).collect())
    }
}

#[derive(Clone, Default)]
pub struct FakeTrino {
    replies: Arc<HashMap<String, Reply>>,
    received: Arc<Mutex<Vec<String>>>,
    opened: Arc<AtomicUsize>,
}

impl FakeTrino {
    /// A cluster with the `memory` and `system` catalogs and a `users` table
    pub fn new() -> Self {
        Self::default()
            .reply("SELECT 1", Reply::rows(&[("_col0", "integer")], vec![vec![json!(1)]]))
            .reply("SHOW CATALOGS", Reply::names("Catalog", &["memory", "system"]))
            .reply("SHOW SCHEMAS FROM memory", Reply::names("Schema", &["default", "information_schema"]))
            .reply("SHOW TABLES FROM memory.default", Reply::names("Table", &["orders", "users"]))
            .reply("DESCRIBE memory.default.users", describe_users())
            .reply(
                "SELECT id, name FROM users",
                Reply::rows(
                    &[("id", "bigint"), ("name", "varchar")],
                    vec![vec![json!(1), json!("alice")], vec![json!(2), json!("bob")]],
                ),
            )
    }

    pub fn reply(mut self, sql: &str, reply: Reply) -> Self {
        Arc::make_mut(&mut self.replies).insert(sql.to_string(), reply);
        self
    }

    /// Statements received so far, in arrival order
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

pub fn describe_users() -> Reply {
    Reply::rows(
        &[("Column", "varchar"), ("Type", "varchar"), ("Extra", "varchar"), ("Comment", "varchar")],
        vec![
            vec![json!("id"), json!("bigint"), json!(""), json!("")],
            vec![json!("name"), json!("varchar"), json!(""), json!("display name")],
        ],
    )
}

pub struct FakeConnection {
    replies: Arc<HashMap<String, Reply>>,
    received: Arc<Mutex<Vec<String>>>,
}

pub struct FakeCursor {
    columns: Vec<ColumnInfo>,
    rows: VecDeque<RawRow>,
}

impl Connector for FakeTrino {
    type Connection = FakeConnection;

    async fn connect(&self) -> Result<FakeConnection, DriverError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConnection { replies: Arc::clone(&self.replies), received: Arc::clone(&self.received) })
    }
}

impl Connection for FakeConnection {
    type Cursor = FakeCursor;

    async fn query(&mut self, sql: &str) -> Result<FakeCursor, DriverError> {
        self.received.lock().unwrap().push(sql.to_string());

        match self.replies.get(sql).cloned() {
            Some(Reply::Rows { columns, rows }) => Ok(FakeCursor { columns, rows: rows.into() }),
            Some(Reply::Fail { name, message }) => Err(DriverError::query(name, 1, message)),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(DriverError::query("TABLE_NOT_FOUND", 46, format!("no scripted reply for '{sql}'"))),
        }
    }
}

impl RowCursor for FakeCursor {
    async fn columns(&mut self) -> Result<Vec<ColumnInfo>, DriverError> {
        Ok(self.columns.clone())
    }

    async fn next_row(&mut self) -> Result<Option<RawRow>, DriverError> {
        Ok(self.rows.pop_front())
    }
}

pub fn config() -> Configuration {
    Configuration { query_timeout: Duration::from_secs(5), ..Configuration::default() }
}

/// Executor over a clone of `fake`; the original keeps observing the shared state
pub fn executor(fake: &FakeTrino, config: &Configuration) -> QueryExecutor<FakeTrino> {
    QueryExecutor::from_config(fake.clone(), config)
}

pub fn resolver(config: &Configuration) -> IdentifierResolver {
    IdentifierResolver::from_config(config)
}

pub fn column(result: &Json, name: &str) -> Vec<Json> {
    result["rows"].as_array().map(|rows| rows.iter().map(|r| r[name].clone()).collect()).unwrap_or_default()
}
