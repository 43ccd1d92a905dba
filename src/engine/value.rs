//! Dynamically typed result values.
//!
//! Trino reports a type name per column and sends each cell as plain JSON. Decoding maps
//! the pair onto the closed [`Value`] enum, so serialization downstream is an exhaustive
//! match rather than a pass-through of arbitrary JSON.
//!
//! | Trino type | Value |
//! |---|---|
//! | `boolean` | `Bool` |
//! | `tinyint`, `smallint`, `integer`, `bigint` | `Int64` |
//! | `real`, `double` | `Float64` |
//! | `date` | `Date` (rendered `YYYY-MM-DD`) |
//! | `timestamp`, `timestamp with time zone` | `Timestamp` |
//! | `varbinary` | `Bytes` (Base64 on the wire and in JSON output) |
//! | `array`, `map`, `row` | `String` holding the JSON text |
//! | anything else (`varchar`, `decimal`, `uuid`, ...) | `String` |

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{NaiveDate, NaiveDateTime};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::{ColumnInfo, RawRow};
use crate::error::DecodeError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single result cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Date(NaiveDate),
    Timestamp(Timestamp),
    Bytes(Vec<u8>),
}

/// A point in time as reported by the engine
///
/// `zone` keeps the engine's zone text verbatim (`UTC`, `+01:00`, `America/New_York`)
/// for `timestamp with time zone` columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    pub datetime: NaiveDateTime,
    pub zone: Option<String>,
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.datetime.format(TIMESTAMP_FORMAT))?;
        if let Some(zone) = &self.zone {
            write!(f, " {zone}")?;
        }
        Ok(())
    }
}

impl Value {
    /// Decode one wire value against its column type
    pub fn decode(raw: serde_json::Value, column: &ColumnInfo) -> Result<Self, DecodeError> {
        if raw.is_null() {
            return Ok(Self::Null);
        }

        let data_type = column.data_type.to_ascii_lowercase();
        let base = data_type.split('(').next().unwrap_or_default().trim();
        let mismatch = |reason: String| DecodeError::Value {
            column: column.name.clone(),
            data_type: column.data_type.clone(),
            reason,
        };

        match base {
            "boolean" => raw.as_bool().map(Self::Bool).ok_or_else(|| mismatch(format!("expected boolean, got {raw}"))),
            "tinyint" | "smallint" | "integer" | "bigint" => raw
                .as_i64()
                .map(Self::Int64)
                .ok_or_else(|| mismatch(format!("expected integer, got {raw}"))),
            "real" | "double" => decode_float(&raw)
                .map(Self::Float64)
                .ok_or_else(|| mismatch(format!("expected number, got {raw}"))),
            "date" => {
                let text = raw.as_str().ok_or_else(|| mismatch(format!("expected date string, got {raw}")))?;
                NaiveDate::parse_from_str(text, DATE_FORMAT).map(Self::Date).map_err(|e| mismatch(e.to_string()))
            }
            "timestamp" | "timestamp with time zone" => {
                let text =
                    raw.as_str().ok_or_else(|| mismatch(format!("expected timestamp string, got {raw}")))?;
                parse_timestamp(text).map(Self::Timestamp).map_err(mismatch)
            }
            "varbinary" => {
                let text = raw.as_str().ok_or_else(|| mismatch(format!("expected base64 string, got {raw}")))?;
                BASE64.decode(text).map(Self::Bytes).map_err(|e| mismatch(e.to_string()))
            }
            "array" | "map" | "row" => Ok(Self::String(raw.to_string())),
            _ => match raw {
                serde_json::Value::String(text) => Ok(Self::String(text)),
                other => Ok(Self::String(other.to_string())),
            },
        }
    }

    /// Borrow the value as a string, if it is one
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int64(i) => serializer.serialize_i64(*i),
            // JSON has no NaN/Infinity
            Self::Float64(f) if !f.is_finite() => serializer.serialize_str(&f.to_string()),
            Self::Float64(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::Date(date) => serializer.collect_str(&date.format(DATE_FORMAT)),
            Self::Timestamp(ts) => serializer.collect_str(ts),
            Self::Bytes(bytes) => serializer.serialize_str(&BASE64.encode(bytes)),
        }
    }
}

fn decode_float(raw: &serde_json::Value) -> Option<f64> {
    match raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

/// Parse `YYYY-MM-DD HH:MM:SS[.fff][ zone]`
fn parse_timestamp(text: &str) -> Result<Timestamp, String> {
    let mut parts = text.splitn(3, ' ');
    let (Some(date), Some(time)) = (parts.next(), parts.next()) else {
        return Err(format!("malformed timestamp '{text}'"));
    };
    let zone = parts.next().map(str::trim).filter(|z| !z.is_empty()).map(String::from);

    NaiveDateTime::parse_from_str(&format!("{date} {time}"), TIMESTAMP_FORMAT)
        .map(|datetime| Timestamp { datetime, zone })
        .map_err(|e| format!("malformed timestamp '{text}': {e}"))
}

/// One result record: column name to value, in column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    /// Decode a wire row against the column list
    pub fn decode(columns: &[ColumnInfo], raw: RawRow) -> Result<Self, DecodeError> {
        if raw.len() != columns.len() {
            return Err(DecodeError::Width { expected: columns.len(), actual: raw.len() });
        }

        let entries = columns
            .iter()
            .zip(raw)
            .map(|(column, cell)| Value::decode(cell, column).map(|v| (column.name.clone(), v)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { entries })
    }

    /// Look up a value by column name
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries.iter().find(|(name, _)| name == column).map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self { entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect() }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
