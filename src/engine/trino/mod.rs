//! Trino Engine Implementation
//!
//! This module implements the [`Connector`] seam for Trino's REST client protocol.
//!
//! # Protocol
//! - `POST {base}/v1/statement` with the SQL text as body starts a query
//! - Each response may carry `columns`, a `data` page, an `error`, and a `nextUri`
//! - The client follows `nextUri` with `GET` until it is absent
//! - `DELETE nextUri` cancels a running query
//!
//! # Implementation Notes
//! - Uses `reqwest` (async HTTP, rustls)
//! - A "connection" is a session: shared HTTP client plus session headers
//! - HTTP keep-alive pooling is capped to the same idle/lifetime policy as the gateway pool
//! - Busy statuses (429, 502, 503, 504) are retried with exponential backoff
//! - Dropping an unfinished cursor sends a best-effort cancel

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::pool::PoolPolicy;
use super::{ColumnInfo, Connection, Connector, RawRow, RowCursor};
use crate::config::Configuration;
use crate::error::{DriverError, GatewayError, Result};

/// Value sent as `X-Trino-Source`
const SOURCE: &str = "trino-gateway";

/// Maximum attempts for a single protocol request when the engine is busy
const MAX_ATTEMPTS: u32 = 5;

/// Base delay between busy retries (doubles each retry)
const RETRY_BASE_DELAY_MS: u64 = 100;

const HEADER_USER: &str = "x-trino-user";
const HEADER_CATALOG: &str = "x-trino-catalog";
const HEADER_SCHEMA: &str = "x-trino-schema";
const HEADER_SOURCE: &str = "x-trino-source";

/// Connection settings recovered from a descriptor
#[derive(Clone, PartialEq, Eq)]
pub struct DescriptorParts {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub catalog: String,
    pub schema: String,
    pub ssl: bool,
    pub ssl_insecure: bool,
    pub access_token: Option<String>,
}

impl std::fmt::Debug for DescriptorParts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorParts")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("catalog", &self.catalog)
            .field("schema", &self.schema)
            .field("ssl", &self.ssl)
            .field("ssl_insecure", &self.ssl_insecure)
            .field("token_auth", &self.access_token.is_some())
            .finish_non_exhaustive()
    }
}

impl DescriptorParts {
    /// Parse a descriptor produced by [`crate::config::build_descriptor`]
    pub fn parse(descriptor: &str) -> Result<Self> {
        let url = Url::parse(descriptor)
            .map_err(|e| GatewayError::config_invalid(format!("Malformed connection descriptor: {e}")))?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| GatewayError::config_invalid("Connection descriptor has no host"))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| GatewayError::config_invalid("Connection descriptor has no port"))?;

        let mut catalog = String::new();
        let mut schema = String::new();
        let mut ssl = false;
        let mut ssl_insecure = false;
        let mut access_token = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "catalog" => catalog = value.into_owned(),
                "schema" => schema = value.into_owned(),
                "SSL" => ssl = value.eq_ignore_ascii_case("true"),
                "SSLInsecure" => ssl_insecure = value.eq_ignore_ascii_case("true"),
                "accessToken" => access_token = Some(value.into_owned()).filter(|t| !t.is_empty()),
                other => debug!("Ignoring unknown descriptor parameter '{other}'"),
            }
        }

        let user = Some(decode_userinfo(url.username())).filter(|u| !u.is_empty());
        let password = url.password().map(decode_userinfo);

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            port,
            user,
            password,
            catalog,
            schema,
            ssl,
            ssl_insecure,
            access_token,
        })
    }

    fn uses_tls(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("https")
    }

    fn statement_url(&self) -> Result<Url> {
        let base = format!("{}://{}:{}/v1/statement", self.scheme, self.host, self.port);
        Url::parse(&base)
            .map_err(|e| GatewayError::config_invalid(format!("Invalid engine endpoint '{base}': {e}")))
    }

    /// Session headers sent with every protocol request
    fn session_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_SOURCE, HeaderValue::from_static(SOURCE));
        headers.insert(HEADER_CATALOG, header_value("catalog", &self.catalog)?);
        headers.insert(HEADER_SCHEMA, header_value("schema", &self.schema)?);

        if let Some(token) = &self.access_token {
            let mut auth = header_value("access token", &format!("Bearer {token}"))?;
            auth.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth);
            return Ok(headers);
        }

        if let Some(user) = &self.user {
            headers.insert(HEADER_USER, header_value("user", user)?);
        }

        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            if !self.uses_tls() {
                warn!("Password authentication over plain HTTP; the engine will likely reject it");
            }
            let user = self.user.as_deref().unwrap_or_default();
            let credentials = BASE64.encode(format!("{user}:{password}"));
            let mut auth = header_value("credentials", &format!("Basic {credentials}"))?;
            auth.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth);
        }

        Ok(headers)
    }
}

/// Userinfo is written with form encoding (`+` for space), which URL parsing leaves as-is
fn decode_userinfo(raw: &str) -> String {
    url::form_urlencoded::parse(raw.as_bytes())
        .next()
        .map(|(decoded, _)| decoded.into_owned())
        .unwrap_or_default()
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| GatewayError::config_invalid(format!("The {field} contains characters not allowed in HTTP headers")))
}

/// Shared, immutable state for every connection from one connector
#[derive(Debug)]
struct Session {
    client: Client,
    statement_url: Url,
    headers: HeaderMap,
}

/// Trino connector built from a connection descriptor
#[derive(Debug, Clone)]
pub struct TrinoConnector {
    session: Arc<Session>,
}

impl TrinoConnector {
    /// Build a connector from a descriptor string
    pub fn from_descriptor(descriptor: &str, policy: PoolPolicy) -> Result<Self> {
        let parts = DescriptorParts::parse(descriptor)?;

        if parts.ssl && !parts.uses_tls() {
            debug!("SSL flag set on a plain HTTP descriptor; TLS follows the scheme");
        }

        let insecure = parts.uses_tls() && parts.ssl_insecure;
        if insecure {
            warn!("TLS certificate verification is disabled (TRINO_SSL_INSECURE=true)");
        }

        let client = Client::builder()
            .user_agent(concat!("trino-gateway/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(policy.max_idle)
            .pool_idle_timeout(policy.max_lifetime)
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| GatewayError::config_invalid(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            session: Arc::new(Session {
                client,
                statement_url: parts.statement_url()?,
                headers: parts.session_headers()?,
            }),
        })
    }

    /// Build a connector straight from a configuration
    pub fn from_config(config: &Configuration, policy: PoolPolicy) -> Result<Self> {
        Self::from_descriptor(&config.descriptor(), policy)
    }
}

impl Connector for TrinoConnector {
    type Connection = TrinoConnection;

    async fn connect(&self) -> std::result::Result<TrinoConnection, DriverError> {
        // HTTP sessions are lazy: the transport connects on the first request
        Ok(TrinoConnection { session: Arc::clone(&self.session) })
    }
}

/// One Trino client session
#[derive(Debug)]
pub struct TrinoConnection {
    session: Arc<Session>,
}

impl Connection for TrinoConnection {
    type Cursor = TrinoCursor;

    async fn query(&mut self, sql: &str) -> std::result::Result<TrinoCursor, DriverError> {
        let session = &self.session;
        let first = send(|| {
            session
                .client
                .post(session.statement_url.clone())
                .headers(session.headers.clone())
                .header(CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(sql.to_string())
        })
        .await?;

        debug!(query_id = %first.id, "Submitted statement");

        let mut cursor = TrinoCursor {
            session: Arc::clone(&self.session),
            next_uri: None,
            columns: None,
            buffered: VecDeque::new(),
        };
        cursor.absorb(first)?;
        Ok(cursor)
    }
}

/// Cursor that pages through a running Trino query
pub struct TrinoCursor {
    session: Arc<Session>,
    next_uri: Option<String>,
    columns: Option<Vec<ColumnInfo>>,
    buffered: VecDeque<RawRow>,
}

impl TrinoCursor {
    fn absorb(&mut self, page: QueryResults) -> std::result::Result<(), DriverError> {
        self.next_uri = page.next_uri;

        if let Some(error) = page.error {
            self.next_uri = None;
            return Err(DriverError::query(error.error_name, error.error_code, error.message));
        }

        if self.columns.is_none() {
            self.columns = page
                .columns
                .map(|cols| cols.into_iter().map(|c| ColumnInfo::new(c.name, c.type_name)).collect());
        }

        if let Some(data) = page.data {
            self.buffered.extend(data);
        }

        Ok(())
    }

    /// Fetch the next page; `false` once the query has finished
    async fn advance(&mut self) -> std::result::Result<bool, DriverError> {
        let Some(uri) = self.next_uri.clone() else {
            return Ok(false);
        };

        let session = &self.session;
        let page = send(|| session.client.get(uri.as_str()).headers(session.headers.clone())).await?;
        self.absorb(page)?;
        Ok(true)
    }
}

impl RowCursor for TrinoCursor {
    async fn columns(&mut self) -> std::result::Result<Vec<ColumnInfo>, DriverError> {
        while self.columns.is_none() {
            if !self.advance().await? {
                break;
            }
        }
        Ok(self.columns.clone().unwrap_or_default())
    }

    async fn next_row(&mut self) -> std::result::Result<Option<RawRow>, DriverError> {
        loop {
            if let Some(row) = self.buffered.pop_front() {
                return Ok(Some(row));
            }
            if !self.advance().await? {
                return Ok(None);
            }
        }
    }
}

impl Drop for TrinoCursor {
    fn drop(&mut self) {
        let Some(uri) = self.next_uri.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        debug!("Cancelling unfinished query");
        let request = self.session.client.delete(uri).headers(self.session.headers.clone());
        handle.spawn(async move {
            if let Err(e) = request.send().await {
                debug!("Query cancel request failed: {e}");
            }
        });
    }
}

/// Send a protocol request, retrying while the engine reports it is busy
async fn send<F>(request: F) -> std::result::Result<QueryResults, DriverError>
where
    F: Fn() -> RequestBuilder + Send,
{
    let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
    let mut attempt = 1;

    loop {
        let response = request().send().await?;
        let status = response.status();

        if status.is_success() {
            return response
                .json::<QueryResults>()
                .await
                .map_err(|e| DriverError::protocol(format!("Invalid response body: {e}")));
        }

        if is_busy(status) && attempt < MAX_ATTEMPTS {
            debug!("Engine busy (HTTP {status}), retrying in {delay:?}");
            tokio::time::sleep(delay).await;
            delay *= 2;
            attempt += 1;
            continue;
        }

        let body = response.text().await.unwrap_or_default();
        return Err(DriverError::Status { status: status.as_u16(), body });
    }
}

fn is_busy(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

// ============================================================================
// Protocol Structures
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResults {
    id: String,
    next_uri: Option<String>,
    columns: Option<Vec<WireColumn>>,
    data: Option<Vec<RawRow>>,
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireColumn {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireError {
    message: String,
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    error_name: String,
}
