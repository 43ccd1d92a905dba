//! Configuration Management
//!
//! This module resolves the gateway configuration from environment variables.
//! The resulting [`Configuration`] is an immutable snapshot, built once at startup.
//!
//! # Environment Variables
//! | Variable | Default |
//! |---|---|
//! | `TRINO_HOST` | `localhost` |
//! | `TRINO_PORT` | `8080` |
//! | `TRINO_USER` | `trino` |
//! | `TRINO_PASSWORD` | empty |
//! | `TRINO_CATALOG` | `memory` |
//! | `TRINO_SCHEMA` | `default` |
//! | `TRINO_SCHEME` | `https` |
//! | `TRINO_SSL` | `true` |
//! | `TRINO_SSL_INSECURE` | `true` |
//! | `TRINO_ALLOW_WRITE_QUERIES` | `false` |
//! | `TRINO_QUERY_TIMEOUT` | `30` (seconds) |
//! | `TRINO_EXTERNAL_AUTHENTICATION` | `false` |
//! | `TRINO_ACCESS_TOKEN` | empty |
//!
//! Malformed values never fail startup: they fall back to a default and log a warning.

mod descriptor;

pub use descriptor::build_descriptor;

use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

/// Default query timeout in seconds
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Default Trino HTTP port
pub const DEFAULT_PORT: u16 = 8080;

/// Authentication mode selected by the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode<'a> {
    /// OAuth bearer token (external authentication)
    Token(&'a str),
    /// Username and password
    Password { user: &'a str, password: &'a str },
}

/// Resolved gateway configuration
///
/// WARNING: `password` and `access_token` are sensitive. The `Debug` impl redacts them.
#[derive(Clone, PartialEq, Eq)]
pub struct Configuration {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Default catalog for metadata calls
    pub catalog: String,
    /// Default schema for metadata calls
    pub schema: String,
    pub scheme: String,
    /// Always true when `scheme` is `https`
    pub tls_enabled: bool,
    pub tls_insecure_skip_verify: bool,
    /// Disables the read-only classifier entirely
    pub allow_write_queries: bool,
    pub query_timeout: Duration,
    pub external_auth_enabled: bool,
    pub access_token: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            user: "trino".to_string(),
            password: String::new(),
            catalog: "memory".to_string(),
            schema: "default".to_string(),
            scheme: "https".to_string(),
            tls_enabled: true,
            tls_insecure_skip_verify: true,
            allow_write_queries: false,
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            external_auth_enabled: false,
            access_token: String::new(),
        }
    }
}

impl Configuration {
    /// Load configuration from process environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Keys are the `TRINO_*` environment variable names. A missing key uses the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str, fallback: &str| lookup(key).unwrap_or_else(|| fallback.to_string());

        let scheme = get("TRINO_SCHEME", &defaults.scheme);
        let port = parse_port(&get("TRINO_PORT", &DEFAULT_PORT.to_string()));
        let tls_enabled = parse_bool("TRINO_SSL", &get("TRINO_SSL", "true"));
        let tls_insecure_skip_verify =
            parse_bool("TRINO_SSL_INSECURE", &get("TRINO_SSL_INSECURE", "true"));
        let allow_write_queries =
            parse_bool("TRINO_ALLOW_WRITE_QUERIES", &get("TRINO_ALLOW_WRITE_QUERIES", "false"));
        let external_auth_enabled = parse_bool(
            "TRINO_EXTERNAL_AUTHENTICATION",
            &get("TRINO_EXTERNAL_AUTHENTICATION", "false"),
        );
        let query_timeout = parse_timeout(&get(
            "TRINO_QUERY_TIMEOUT",
            &DEFAULT_QUERY_TIMEOUT_SECS.to_string(),
        ));

        let config = Self {
            host: get("TRINO_HOST", &defaults.host),
            port,
            user: get("TRINO_USER", &defaults.user),
            password: get("TRINO_PASSWORD", ""),
            catalog: get("TRINO_CATALOG", &defaults.catalog),
            schema: get("TRINO_SCHEMA", &defaults.schema),
            scheme,
            tls_enabled,
            tls_insecure_skip_verify,
            allow_write_queries,
            query_timeout,
            external_auth_enabled,
            access_token: get("TRINO_ACCESS_TOKEN", ""),
        }
        .normalized();

        config.log_warnings();
        config
    }

    /// Apply invariants that hold regardless of input
    ///
    /// An `https` scheme forces TLS on.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.scheme.eq_ignore_ascii_case("https") {
            self.tls_enabled = true;
        }
        self
    }

    /// Select the authentication mode
    ///
    /// Token auth wins only when external authentication is enabled AND a token is present.
    #[must_use]
    pub fn auth_mode(&self) -> AuthMode<'_> {
        if self.external_auth_enabled && !self.access_token.is_empty() {
            AuthMode::Token(&self.access_token)
        } else {
            AuthMode::Password { user: &self.user, password: &self.password }
        }
    }

    /// Build the connection descriptor for this configuration
    #[must_use]
    pub fn descriptor(&self) -> String {
        build_descriptor(self)
    }

    fn log_warnings(&self) {
        if self.allow_write_queries {
            warn!(
                "Write queries are enabled (TRINO_ALLOW_WRITE_QUERIES=true). \
                 SQL injection protection is bypassed."
            );
        }

        if self.external_auth_enabled {
            if self.access_token.is_empty() {
                warn!(
                    "External authentication is enabled but no access token provided. \
                     Falling back to user/password authentication. Set TRINO_ACCESS_TOKEN."
                );
            } else {
                info!("External authentication (OAuth) is enabled");
            }
        }
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &str| if s.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("Configuration")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("catalog", &self.catalog)
            .field("schema", &self.schema)
            .field("scheme", &self.scheme)
            .field("tls_enabled", &self.tls_enabled)
            .field("tls_insecure_skip_verify", &self.tls_insecure_skip_verify)
            .field("allow_write_queries", &self.allow_write_queries)
            .field("query_timeout", &self.query_timeout)
            .field("external_auth_enabled", &self.external_auth_enabled)
            .field("access_token", &redact(&self.access_token))
            .finish()
    }
}

/// Parse a boolean flag the way environment flags are commonly written
///
/// Accepts `1/t/true` and `0/f/false` in any case. Anything else is false, with a warning.
fn parse_bool(key: &str, raw: &str) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => true,
        "0" | "f" | "false" => false,
        _ => {
            warn!("Invalid {key} '{raw}': not a boolean. Using false");
            false
        }
    }
}

fn parse_port(raw: &str) -> u16 {
    match raw.trim().parse::<u16>() {
        Ok(port) => port,
        Err(_) => {
            warn!("Invalid TRINO_PORT '{raw}': not a valid port. Using default of {DEFAULT_PORT}");
            DEFAULT_PORT
        }
    }
}

fn parse_timeout(raw: &str) -> Duration {
    let default = Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS);
    match raw.trim().parse::<i64>() {
        Ok(secs) if secs > 0 => Duration::from_secs(secs.unsigned_abs()),
        Ok(secs) => {
            warn!(
                "Invalid TRINO_QUERY_TIMEOUT '{secs}': must be positive. \
                 Using default of {DEFAULT_QUERY_TIMEOUT_SECS} seconds"
            );
            default
        }
        Err(_) => {
            warn!(
                "Invalid TRINO_QUERY_TIMEOUT '{raw}': not an integer. \
                 Using default of {DEFAULT_QUERY_TIMEOUT_SECS} seconds"
            );
            default
        }
    }
}
