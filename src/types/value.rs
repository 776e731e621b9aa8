//! Typed data values and their coercion from raw record text

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

/// Primitive kinds a data element can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    Integer,
    String,
    Boolean,
    Decimal,
    Timestamp,
    Uri,
    Void,
}

impl DataType {
    pub const ALL: [DataType; 7] = [
        Self::Integer,
        Self::String,
        Self::Boolean,
        Self::Decimal,
        Self::Timestamp,
        Self::Uri,
        Self::Void,
    ];

    /// Canonical wire name. Title case, except `URI`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "Integer",
            Self::String => "String",
            Self::Boolean => "Boolean",
            Self::Decimal => "Decimal",
            Self::Timestamp => "Timestamp",
            Self::Uri => "URI",
            Self::Void => "Void",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from typing raw values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("invalid datatype: {0}")]
    UnknownType(String),

    #[error("cannot coerce '{raw}' to {data_type}")]
    Coercion { data_type: DataType, raw: String },

    #[error("unexpected wire value for {data_type}: {value}")]
    Wire { data_type: DataType, value: String },
}

impl FromStr for DataType {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|dt| dt.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValueError::UnknownType(s.to_string()))
    }
}

impl TryFrom<String> for DataType {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataType> for String {
    fn from(dt: DataType) -> Self {
        dt.as_str().to_string()
    }
}

/// A value tagged with its primitive kind, held in canonical form.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Integer(i64),
    String(String),
    Boolean(bool),
    Decimal(Decimal),
    Timestamp(NaiveDateTime),
    Uri(Url),
    /// Structurally present, deliberately empty.
    Void,
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

impl TypedValue {
    /// Coerce raw record text into a value of the given kind.
    ///
    /// `Void` ignores the input entirely.
    pub fn coerce(data_type: DataType, raw: &str) -> Result<Self, ValueError> {
        let fail = || ValueError::Coercion {
            data_type,
            raw: raw.to_string(),
        };
        let trimmed = raw.trim();

        match data_type {
            DataType::Integer => trimmed.parse().map(Self::Integer).map_err(|_| fail()),
            DataType::String => Ok(Self::String(raw.to_string())),
            DataType::Boolean => parse_bool(trimmed).map(Self::Boolean).ok_or_else(fail),
            DataType::Decimal => Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map(Self::Decimal)
                .map_err(|_| fail()),
            DataType::Timestamp => parse_timestamp(trimmed).map(Self::Timestamp).ok_or_else(fail),
            DataType::Uri => Url::parse(trimmed).map(Self::Uri).map_err(|_| fail()),
            DataType::Void => Ok(Self::Void),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Integer(_) => DataType::Integer,
            Self::String(_) => DataType::String,
            Self::Boolean(_) => DataType::Boolean,
            Self::Decimal(_) => DataType::Decimal,
            Self::Timestamp(_) => DataType::Timestamp,
            Self::Uri(_) => DataType::Uri,
            Self::Void => DataType::Void,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// JSON representation used by the remote store.
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Integer(i) => Value::from(*i),
            Self::String(s) => Value::String(s.clone()),
            Self::Boolean(b) => Value::String(b.to_string()),
            Self::Decimal(d) => Value::String(d.to_string()),
            Self::Timestamp(ts) => Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Self::Uri(u) => Value::String(u.to_string()),
            Self::Void => Value::String("Void".to_string()),
        }
    }

    /// Decode a wire value of a known kind.
    pub fn from_wire(data_type: DataType, value: &Value) -> Result<Self, ValueError> {
        let wire_err = || ValueError::Wire {
            data_type,
            value: value.to_string(),
        };
        match (data_type, value) {
            (DataType::Void, _) => Ok(Self::Void),
            (DataType::Integer, Value::Number(n)) => n.as_i64().map(Self::Integer).ok_or_else(wire_err),
            (DataType::Boolean, Value::Bool(b)) => Ok(Self::Boolean(*b)),
            (_, Value::String(s)) => Self::coerce(data_type, s),
            _ => Err(wire_err()),
        }
    }

    /// Render back to plain text, as a record would have carried it.
    pub fn as_text(&self) -> String {
        match self {
            Self::Void => String::new(),
            Self::String(s) => s.clone(),
            other => match other.to_wire() {
                Value::String(s) => s,
                v => v.to_string(),
            },
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("<void>"),
            other => f.write_str(&other.as_text()),
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Offsets are normalized to UTC and dropped; the store has no zone support.
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
