//! Logging setup.
//!
//! Everything is written to stderr: stdout carries JSON envelopes (CLI) or JSON-RPC
//! frames (MCP server) and must stay clean.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter applied when `RUST_LOG` is unset or unparsable
pub const DEFAULT_FILTER: &str = "trino_gateway=info";

/// Initialize the global tracing subscriber
///
/// - `RUST_LOG` overrides the default filter
/// - `LOG_FORMAT=json` switches to structured JSON lines
pub fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    if use_json(std::env::var("LOG_FORMAT").ok().as_deref()) {
        registry.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)).try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_ansi(false))
            .try_init()?;
    }

    Ok(())
}

fn use_json(format: Option<&str>) -> bool {
    format.is_some_and(|v| v.eq_ignore_ascii_case("json"))
}
