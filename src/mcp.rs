//! MCP (Model Context Protocol) Server
//!
//! This module implements an MCP server using manual JSON-RPC 2.0 over stdio.
//!
//! # Architecture
//!
//! - **Transport**: JSON-RPC 2.0 over stdio (one JSON document per line)
//! - **Dispatch**: each request runs on its own task; one writer task owns stdout
//! - **Schemas**: tool input schemas are generated from the argument structs with `schemars`
//!
//! Requests without an `id` are notifications and never get a response.
//!
//! # MCP Tools
//!
//! - `execute_query` - Run SQL through the read-only gate
//! - `list_catalogs` - List catalogs
//! - `list_schemas` - List schemas in a catalog
//! - `list_tables` - List tables in a schema
//! - `get_table_schema` - Describe a table
//!
//! Tool failures are reported in-band (`isError: true` with an error envelope as text),
//! so the agent sees the error code. JSON-RPC errors are reserved for protocol misuse.
//!
//! # Usage
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "trino": {
//!       "command": "trino-gateway",
//!       "args": ["mcp"],
//!       "env": { "TRINO_HOST": "trino.example.com", "TRINO_PORT": "443" }
//!     }
//!   }
//! }
//! ```

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::engine::{Connector, QueryExecutor, QueryResult};
use crate::error::GatewayError;
use crate::introspect::{IdentifierResolver, Introspector};
use crate::output::{ErrorEnvelope, Metadata, SuccessEnvelope};

/// MCP protocol revision this server speaks
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

// ============================================================================
// JSON-RPC 2.0 Structures
// ============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn result(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    fn error(id: Option<Value>, error: JsonRpcError) -> Self {
        Self { jsonrpc: "2.0", id, result: None, error: Some(error) }
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

// ============================================================================
// MCP Tool Result Structures
// ============================================================================

#[derive(Debug, Serialize)]
struct TextContent {
    #[serde(rename = "type")]
    content_type: &'static str,
    text: String,
}

#[derive(Debug, Serialize)]
struct CallToolResult {
    content: Vec<TextContent>,
    #[serde(rename = "isError")]
    is_error: bool,
}

impl CallToolResult {
    fn text(payload: &impl Serialize, is_error: bool) -> Result<Value> {
        let text = serde_json::to_string_pretty(payload)?;
        let result = Self { content: vec![TextContent { content_type: "text", text }], is_error };
        Ok(serde_json::to_value(result)?)
    }
}

// ============================================================================
// Tool Arguments
// ============================================================================

/// Arguments for `execute_query`
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteQueryArgs {
    /// The SQL query to execute
    pub query: String,
}

/// Arguments for `list_catalogs`
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListCatalogsArgs {}

/// Arguments for `list_schemas`
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListSchemasArgs {
    /// The catalog to list schemas from (optional, defaults to TRINO_CATALOG)
    #[serde(default)]
    pub catalog: Option<String>,
}

/// Arguments for `list_tables`
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListTablesArgs {
    /// The catalog containing the schema (optional, defaults to TRINO_CATALOG)
    #[serde(default)]
    pub catalog: Option<String>,
    /// The schema to list tables from (optional, defaults to TRINO_SCHEMA)
    #[serde(default)]
    pub schema: Option<String>,
}

/// Arguments for `get_table_schema`
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetTableSchemaArgs {
    /// The catalog containing the table (optional)
    #[serde(default)]
    pub catalog: Option<String>,
    /// The schema containing the table (optional)
    #[serde(default)]
    pub schema: Option<String>,
    /// The table to describe. May be qualified as `schema.table` or `catalog.schema.table`
    pub table: String,
}

/// Successful tool payloads
enum ToolData {
    Names(Vec<String>),
    Rows(QueryResult),
}

// ============================================================================
// MCP Server
// ============================================================================

/// MCP server exposing a query executor as tools
pub struct McpServer<C: Connector> {
    executor: QueryExecutor<C>,
    resolver: IdentifierResolver,
}

impl<C: Connector> McpServer<C> {
    pub fn new(executor: QueryExecutor<C>, resolver: IdentifierResolver) -> Self {
        Self { executor, resolver }
    }

    /// Serve on process stdio until stdin closes
    pub async fn serve(self: Arc<Self>) -> Result<()> {
        self.serve_io(BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
    }

    /// Serve JSON-RPC lines from `reader`, writing responses to `writer`
    ///
    /// Returns after the reader hits EOF and every in-flight request has answered.
    pub async fn serve_io<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let writer_task = tokio::spawn(write_responses(rx, writer));

        let mut in_flight = JoinSet::new();
        let mut lines = reader.lines();

        info!("MCP server ready");
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(req) => req,
                Err(e) => {
                    warn!("Discarding unparsable request: {e}");
                    let response =
                        JsonRpcResponse::error(None, JsonRpcError::new(PARSE_ERROR, format!("Parse error: {e}")));
                    queue(&tx, &response);
                    continue;
                }
            };

            let server = Arc::clone(&self);
            let tx = tx.clone();
            in_flight.spawn(async move {
                if let Some(response) = server.handle_request(request).await {
                    queue(&tx, &response);
                }
            });
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Request task failed: {e}");
            }
        }

        drop(tx);
        writer_task.await??;
        info!("MCP server shutting down");
        Ok(())
    }

    /// Route a request; `None` for notifications
    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id else {
            debug!(method = %request.method, "Notification received");
            return None;
        };

        let outcome = match request.method.as_str() {
            "initialize" => Ok(initialize_result()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tool_definitions() })),
            "tools/call" => self.handle_call_tool(request.params).await,
            other => Err(JsonRpcError::new(METHOD_NOT_FOUND, format!("Unknown method: {other}"))),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::result(Some(id), result),
            Err(error) => JsonRpcResponse::error(Some(id), error),
        })
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> std::result::Result<Value, JsonRpcError> {
        let params = params.ok_or_else(|| JsonRpcError::new(INVALID_PARAMS, "Missing params"))?;
        let name = params["name"]
            .as_str()
            .ok_or_else(|| JsonRpcError::new(INVALID_PARAMS, "Missing tool name"))?;
        let arguments = match params.get("arguments") {
            Some(Value::Null) | None => json!({}),
            Some(args) => args.clone(),
        };

        let start = Instant::now();
        let outcome = match name {
            "execute_query" => self.tool_execute_query(arguments).await,
            "list_catalogs" => self.tool_list_catalogs(arguments).await,
            "list_schemas" => self.tool_list_schemas(arguments).await,
            "list_tables" => self.tool_list_tables(arguments).await,
            "get_table_schema" => self.tool_get_table_schema(arguments).await,
            other => return Err(JsonRpcError::new(INVALID_PARAMS, format!("Unknown tool: {other}"))),
        };

        let rendered = match outcome {
            Ok(ToolData::Rows(result)) => CallToolResult::text(&SuccessEnvelope::from_result(name, result), false),
            Ok(ToolData::Names(names)) => {
                let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                let meta = Metadata::with_rows(elapsed, names.len());
                CallToolResult::text(&SuccessEnvelope::new(name, names, meta), false)
            }
            Err(e) => {
                warn!(tool = name, code = e.error_code(), "Tool call failed: {e}");
                CallToolResult::text(&ErrorEnvelope::from_error(name, &e), true)
            }
        };

        rendered.map_err(|e| JsonRpcError::new(INTERNAL_ERROR, e.to_string()))
    }

    fn introspector(&self) -> Introspector<'_, C> {
        Introspector::new(&self.executor, &self.resolver)
    }

    async fn tool_execute_query(&self, arguments: Value) -> crate::Result<ToolData> {
        let args: ExecuteQueryArgs = parse_args(arguments)?;
        if args.query.trim().is_empty() {
            return Err(GatewayError::invalid_input("query must not be empty"));
        }
        self.executor.execute(&args.query).await.map(ToolData::Rows)
    }

    async fn tool_list_catalogs(&self, arguments: Value) -> crate::Result<ToolData> {
        let _: ListCatalogsArgs = parse_args(arguments)?;
        self.introspector().list_catalogs().await.map(ToolData::Names)
    }

    async fn tool_list_schemas(&self, arguments: Value) -> crate::Result<ToolData> {
        let args: ListSchemasArgs = parse_args(arguments)?;
        let catalog = args.catalog.unwrap_or_default();
        self.introspector().list_schemas(&catalog).await.map(ToolData::Names)
    }

    async fn tool_list_tables(&self, arguments: Value) -> crate::Result<ToolData> {
        let args: ListTablesArgs = parse_args(arguments)?;
        let catalog = args.catalog.unwrap_or_default();
        let schema = args.schema.unwrap_or_default();
        self.introspector().list_tables(&catalog, &schema).await.map(ToolData::Names)
    }

    async fn tool_get_table_schema(&self, arguments: Value) -> crate::Result<ToolData> {
        let args: GetTableSchemaArgs = parse_args(arguments)?;
        if args.table.trim().is_empty() {
            return Err(GatewayError::invalid_input("table must not be empty"));
        }
        let catalog = args.catalog.unwrap_or_default();
        let schema = args.schema.unwrap_or_default();
        self.introspector().table_schema(&catalog, &schema, &args.table).await.map(ToolData::Rows)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

async fn write_responses<W>(mut rx: mpsc::UnboundedReceiver<String>, mut writer: W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}

fn queue(tx: &mpsc::UnboundedSender<String>, response: &JsonRpcResponse) {
    match serde_json::to_string(response) {
        Ok(line) => {
            if tx.send(line).is_err() {
                error!("Response writer has stopped; dropping response");
            }
        }
        Err(e) => error!("Failed to serialize response: {e}"),
    }
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> crate::Result<T> {
    serde_json::from_value(arguments).map_err(|e| GatewayError::invalid_input(format!("Invalid arguments: {e}")))
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": "trino-gateway",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

fn tool<T: JsonSchema>(name: &str, description: &str) -> Value {
    let schema = schemars::schema_for!(T);
    json!({
        "name": name,
        "description": description,
        "inputSchema": schema,
    })
}

/// Tool definitions advertised by `tools/list`
pub fn tool_definitions() -> Vec<Value> {
    vec![
        tool::<ExecuteQueryArgs>(
            "execute_query",
            "Execute a SQL query against the Trino server. Only SELECT, SHOW, DESCRIBE, EXPLAIN \
             and WITH queries are allowed unless write queries are enabled. Returns columns and rows.",
        ),
        tool::<ListCatalogsArgs>("list_catalogs", "List all available catalogs in the Trino server"),
        tool::<ListSchemasArgs>("list_schemas", "List all schemas in a catalog"),
        tool::<ListTablesArgs>("list_tables", "List all tables in a schema"),
        tool::<GetTableSchemaArgs>(
            "get_table_schema",
            "Get the schema of a table: column names, types and extra information",
        ),
    ]
}
