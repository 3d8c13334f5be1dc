//! Result payloads returned by SQL execution.
//!
//! The backend answers `/run-sql` with loosely shaped JSON: an array of row
//! objects, a bare string or number, or any of those wrapped in `{"data": ..}`.
//! [`QueryResult::decode`] inspects the shape exactly once at the transport
//! boundary; everything downstream matches on the tagged variant.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ChatError;

/// A single cell value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::Text(s.clone()),
            nested => Self::Text(stringify(nested)),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Flatten any JSON value into display text: arrays join with `, `, objects
/// become `key: value` pairs.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(", "),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}: {}", stringify(v)))
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// Tabular rows with a fixed column order taken from the first row.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

impl Table {
    /// Build from row objects. Keys missing from a later row read as null;
    /// keys absent from the first row are dropped.
    pub fn from_rows(rows: &[Map<String, Value>]) -> Self {
        let columns: Vec<String> = rows
            .first()
            .map(|first| first.keys().cloned().collect())
            .unwrap_or_default();
        let rows = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|col| row.get(col).map_or(Scalar::Null, Scalar::from_value))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Scalar> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().filter_map(move |row| row.get(idx)))
    }

    /// Back to an array of row objects.
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.rows
                .iter()
                .map(|row| {
                    let obj: Map<String, Value> = self
                        .columns
                        .iter()
                        .cloned()
                        .zip(row.iter().map(Scalar::to_value))
                        .collect();
                    Value::Object(obj)
                })
                .collect(),
        )
    }
}

/// Decoded result of running SQL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueryResult {
    #[serde(rename = "text_result")]
    Text { text: String },
    #[serde(rename = "table_result")]
    Table { table: Table },
    #[serde(rename = "scalar_result")]
    Scalar { value: Scalar },
}

impl QueryResult {
    /// Decode a `/run-sql` response body.
    pub fn decode(body: Value) -> Result<Self, ChatError> {
        let inner = match body {
            Value::Object(mut map) if map.contains_key("data") => {
                map.remove("data").unwrap_or(Value::Null)
            }
            other => other,
        };

        match inner {
            Value::Null => Err(ChatError::EmptyResponse("data")),
            Value::Array(items) => {
                if items.iter().all(Value::is_object) {
                    let rows: Vec<Map<String, Value>> = items
                        .into_iter()
                        .filter_map(|v| match v {
                            Value::Object(m) => Some(m),
                            _ => None,
                        })
                        .collect();
                    Ok(Self::Table { table: Table::from_rows(&rows) })
                } else {
                    Ok(Self::Text { text: stringify(&Value::Array(items)) })
                }
            }
            Value::String(text) => Ok(Self::Text { text }),
            v @ (Value::Number(_) | Value::Bool(_)) => Ok(Self::Scalar {
                value: Scalar::from_value(&v),
            }),
            obj @ Value::Object(_) => Ok(Self::Text { text: stringify(&obj) }),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Self::Table { table } => Some(table),
            _ => None,
        }
    }

    /// JSON form handed back to the backend as summarization context.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text { text } => Value::String(text.clone()),
            Self::Table { table } => table.to_json(),
            Self::Scalar { value } => value.to_value(),
        }
    }

    /// One-line description used in logs and plain-text views.
    pub fn summary(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Table { table } => format!("{} rows x {} columns", table.len(), table.columns.len()),
            Self::Scalar { value } => value.to_string(),
        }
    }
}
