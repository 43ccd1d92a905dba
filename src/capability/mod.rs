//! Read-Only Query Classification
//!
//! This module decides whether a raw SQL string may run while write queries are
//! disallowed. It is a heuristic firewall, not a parser: substring and prefix matching
//! on normalized text.
//!
//! # Classification Rules (in order)
//! 1. Normalize: trim, lower-case, CR/LF to spaces
//! 2. Any semicolon rejects (statement stacking)
//! 3. Any write verb followed by a space, anywhere in the text, rejects
//! 4. A bare `select`/`show`/`describe`/`explain`/`with` prefix accepts
//! 5. Everything else rejects
//!
//! A write verb inside a string literal or identifier still rejects the query.
//! Changing that is a policy change, not a bug fix.

use crate::error::{GatewayError, Result};

/// Write verbs matched anywhere in the normalized text (trailing space included)
const WRITE_VERBS: [&str; 7] =
    ["insert ", "update ", "delete ", "drop ", "create ", "alter ", "truncate "];

/// Read-only statement prefixes (bare keyword, no trailing space required)
const READ_ONLY_PREFIXES: [&str; 5] = ["select", "show", "describe", "explain", "with"];

/// Check whether a query is treated as read-only
#[must_use]
pub fn is_read_only(query: &str) -> bool {
    let normalized = normalize(query);

    if normalized.contains(';') {
        return false;
    }

    if WRITE_VERBS.iter().any(|verb| normalized.contains(verb)) {
        return false;
    }

    READ_ONLY_PREFIXES.iter().any(|prefix| normalized.starts_with(prefix))
}

/// Gate a query against the write policy
///
/// When `allow_write_queries` is set every query passes unconditionally.
pub fn validate_query(query: &str, allow_write_queries: bool) -> Result<()> {
    if allow_write_queries || is_read_only(query) {
        Ok(())
    } else {
        Err(GatewayError::SecurityRejected)
    }
}

fn normalize(query: &str) -> String {
    query.trim().to_lowercase().replace(['\r', '\n'], " ")
}
