//! Hot-Path Benchmarks
//!
//! Every call pays for classification, and every metadata call for name resolution.
//! These benchmarks measure:
//! - Read-only classification of short, long, and rejected queries
//! - Identifier resolution
//! - Descriptor building for both auth shapes
//! - Row decoding through the executor with an in-memory engine

use std::collections::VecDeque;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use trino_gateway::{
    build_descriptor, is_read_only, ColumnInfo, Configuration, Connection, ConnectionPool, Connector, DriverError,
    IdentifierResolver, PoolPolicy, QueryExecutor, RawRow, RowCursor,
};

fn bench_classifier(c: &mut Criterion) {
    let short = "SELECT * FROM users WHERE id = 1";
    let long = format!(
        "WITH recent AS (SELECT * FROM orders WHERE created > DATE '2024-01-01')\n{}",
        "SELECT o.id, c.name FROM recent o JOIN customers c ON o.customer_id = c.id\n".repeat(50)
    );
    let rejected = "SELECT 1; DROP TABLE users";

    c.bench_function("classify_short_select", |b| b.iter(|| is_read_only(black_box(short))));
    c.bench_function("classify_long_cte", |b| b.iter(|| is_read_only(black_box(&long))));
    c.bench_function("classify_rejected", |b| b.iter(|| is_read_only(black_box(rejected))));
}

fn bench_resolver(c: &mut Criterion) {
    let resolver = IdentifierResolver::new("memory", "default");

    c.bench_function("resolve_bare_table", |b| b.iter(|| resolver.resolve("", "", black_box("users"))));
    c.bench_function("resolve_qualified_table", |b| {
        b.iter(|| resolver.resolve("", "", black_box("hive.sales.orders")));
    });
}

fn bench_descriptor(c: &mut Criterion) {
    let password = Configuration { password: "p@ss w/rd".into(), ..Configuration::default() };
    let token = Configuration {
        external_auth_enabled: true,
        access_token: "eyJhbGciOiJIUzI1NiJ9.payload.signature".into(),
        ..Configuration::default()
    };

    c.bench_function("descriptor_password", |b| b.iter(|| build_descriptor(black_box(&password))));
    c.bench_function("descriptor_token", |b| b.iter(|| build_descriptor(black_box(&token))));
}

// ============================================================================
// Row decoding through the executor
// ============================================================================

struct StaticEngine {
    rows: Vec<RawRow>,
}

struct StaticConnection {
    rows: Vec<RawRow>,
}

struct StaticCursor {
    rows: VecDeque<RawRow>,
}

impl Connector for StaticEngine {
    type Connection = StaticConnection;

    async fn connect(&self) -> Result<StaticConnection, DriverError> {
        Ok(StaticConnection { rows: self.rows.clone() })
    }
}

impl Connection for StaticConnection {
    type Cursor = StaticCursor;

    async fn query(&mut self, _sql: &str) -> Result<StaticCursor, DriverError> {
        Ok(StaticCursor { rows: self.rows.clone().into() })
    }
}

impl RowCursor for StaticCursor {
    async fn columns(&mut self) -> Result<Vec<ColumnInfo>, DriverError> {
        Ok(vec![
            ColumnInfo::new("id", "bigint"),
            ColumnInfo::new("name", "varchar"),
            ColumnInfo::new("created", "timestamp(3)"),
        ])
    }

    async fn next_row(&mut self) -> Result<Option<RawRow>, DriverError> {
        Ok(self.rows.pop_front())
    }
}

fn bench_execute(c: &mut Criterion) {
    let rows = (0..1000).map(|i| vec![json!(i), json!(format!("user {i}")), json!("2024-01-15 10:30:00.000")]).collect();
    let executor = QueryExecutor::new(
        ConnectionPool::new(StaticEngine { rows }, PoolPolicy::default()),
        false,
        Duration::from_secs(30),
    );
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("execute_1000_rows", |b| {
        b.iter(|| {
            let result = runtime.block_on(executor.execute(black_box("SELECT id, name, created FROM users")));
            assert_eq!(result.map(|r| r.len()).ok(), Some(1000));
        });
    });
}

criterion_group!(benches, bench_classifier, bench_resolver, bench_descriptor, bench_execute);
criterion_main!(benches);
