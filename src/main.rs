//! Trino Gateway CLI Entry Point
//!
//! Subcommands:
//! - `mcp` - MCP server on stdio (the default when no subcommand is given)
//! - `query` - Run one query and print the result envelope
//! - `introspect` - Run one metadata operation and print the result envelope
//!
//! Connection settings always come from `TRINO_*` environment variables.
//! All output to stdout is JSON-only. Logs go to stderr.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::{ArgGroup, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use trino_gateway::engine::trino::TrinoConnector;
use trino_gateway::{
    logging, Configuration, ErrorEnvelope, GatewayError, IdentifierResolver, Introspector, McpServer,
    Metadata, PoolPolicy, QueryExecutor, SuccessEnvelope,
};

/// Trino Gateway - agent-facing Trino query gateway
#[derive(Parser)]
#[command(name = "trino-gateway")]
#[command(about = "Agent-facing Trino gateway with read-only enforcement and metadata discovery")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP tools over stdio
    Mcp,

    /// Execute a single SQL query
    Query {
        /// SQL text to execute
        #[arg(long)]
        sql: String,
    },

    /// Discover catalogs, schemas, tables and table columns
    #[command(group(
        ArgGroup::new("operation")
            .required(true)
            .args(["list_catalogs", "list_schemas", "list_tables", "table"])
    ))]
    Introspect {
        #[arg(long)]
        list_catalogs: bool,

        #[arg(long)]
        list_schemas: bool,

        #[arg(long)]
        list_tables: bool,

        /// Describe a table (`table`, `schema.table` or `catalog.schema.table`)
        #[arg(long)]
        table: Option<String>,

        /// Catalog (defaults to TRINO_CATALOG)
        #[arg(long, default_value = "")]
        catalog: String,

        /// Schema (defaults to TRINO_SCHEMA)
        #[arg(long, default_value = "")]
        schema: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init_tracing() {
        eprintln!("Failed to initialize logging: {e}");
    }

    let config = Configuration::from_env();
    let connector = match TrinoConnector::from_config(&config, PoolPolicy::default()) {
        Ok(connector) => connector,
        Err(e) => return fail("startup", &e),
    };
    let executor = QueryExecutor::from_config(connector, &config);
    let resolver = IdentifierResolver::from_config(&config);

    match cli.command.unwrap_or(Commands::Mcp) {
        Commands::Mcp => run_mcp(&config, executor, resolver).await,
        Commands::Query { sql } => match executor.execute(&sql).await {
            Ok(result) => print(&SuccessEnvelope::from_result("query", result)),
            Err(e) => fail("query", &e),
        },
        Commands::Introspect { list_catalogs, list_schemas, list_tables, table, catalog, schema } => {
            let introspector = Introspector::new(&executor, &resolver);
            let start = Instant::now();

            let names = if list_catalogs {
                introspector.list_catalogs().await
            } else if list_schemas {
                introspector.list_schemas(&catalog).await
            } else if list_tables {
                introspector.list_tables(&catalog, &schema).await
            } else {
                let table = table.unwrap_or_default();
                return match introspector.table_schema(&catalog, &schema, &table).await {
                    Ok(result) => print(&SuccessEnvelope::from_result("introspect", result)),
                    Err(e) => fail("introspect", &e),
                };
            };

            match names {
                Ok(names) => {
                    let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                    let meta = Metadata::with_rows(elapsed, names.len());
                    print(&SuccessEnvelope::new("introspect", names, meta))
                }
                Err(e) => fail("introspect", &e),
            }
        }
    }
}

async fn run_mcp(
    config: &Configuration,
    executor: QueryExecutor<TrinoConnector>,
    resolver: IdentifierResolver,
) -> ExitCode {
    info!(
        host = %config.host,
        port = config.port,
        scheme = %config.scheme,
        catalog = %config.catalog,
        schema = %config.schema,
        timeout = ?executor.query_timeout(),
        allow_write_queries = executor.allows_write_queries(),
        "Starting trino-gateway MCP server"
    );

    if let Err(e) = executor.ping().await {
        return fail("startup", &e);
    }
    info!("Connected to Trino");

    match Introspector::new(&executor, &resolver).list_catalogs().await {
        Ok(catalogs) => info!(?catalogs, "Available catalogs"),
        Err(e) => warn!("Could not list catalogs: {e}"),
    }

    let server = Arc::new(McpServer::new(executor, resolver));
    match server.serve().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("MCP server failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn print(envelope: &impl Serialize) -> ExitCode {
    match serde_json::to_string(envelope) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to serialize output: {e}");
            ExitCode::FAILURE
        }
    }
}

fn fail(command: &str, err: &GatewayError) -> ExitCode {
    tracing::error!(code = err.error_code(), "{err}");
    print(&ErrorEnvelope::from_error(command, err));
    ExitCode::FAILURE
}
