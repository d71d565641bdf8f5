//! Row codec: turns work items into `INSERT` statements and fetched rows back
//! into the shape a caller asked for.

use crate::connection::{Connection, Param, Row};
use crate::error::{ProtocolError, ValidationError};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;

#[cfg(test)]
#[path = "row_tests.rs"]
mod tests;

/// Column name to scalar value mapping, iterated in insertion order.
pub type WorkItem = Map<String, Value>;

/// An `INSERT` statement with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub sql: String,
    pub params: Vec<Param>,
}

/// Shape a dequeued row is returned in.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FetchStyle {
    /// Column-keyed map
    #[default]
    Map,
    /// A single column by zero-based position
    Column(usize),
    /// The given template with the row's columns written over it
    Into(WorkItem),
}

impl fmt::Display for FetchStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Map => write!(f, "map"),
            Self::Column(index) => write!(f, "column({})", index),
            Self::Into(template) => write!(f, "into({} columns)", template.len()),
        }
    }
}

/// A decoded row.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Map(WorkItem),
    Column(Value),
}

impl Fetched {
    pub fn as_map(&self) -> Option<&WorkItem> {
        match self {
            Self::Map(item) => Some(item),
            Self::Column(_) => None,
        }
    }

    pub fn into_map(self) -> Option<WorkItem> {
        match self {
            Self::Map(item) => Some(item),
            Self::Column(_) => None,
        }
    }

    pub fn as_column(&self) -> Option<&Value> {
        match self {
            Self::Column(value) => Some(value),
            Self::Map(_) => None,
        }
    }
}

/// Classify every value of `item` into a bound parameter.
///
/// Booleans bind as `Bool`; integers and strings made only of ASCII digits
/// bind as `Int`; everything else scalar binds as `Str`. Arrays and objects
/// are rejected.
pub fn bind_params(item: &WorkItem) -> Result<Vec<Param>, ValidationError> {
    item.iter().map(|(key, value)| bind_value(key, value)).collect()
}

fn bind_value(key: &str, value: &Value) -> Result<Param, ValidationError> {
    match value {
        Value::Array(_) | Value::Object(_) => Err(ValidationError::NonScalarValue {
            key: key.to_string(),
        }),
        Value::Bool(b) => Ok(Param::Bool(*b)),
        Value::Null => Ok(Param::Null),
        Value::Number(n) => Ok(match n.as_i64() {
            Some(i) => Param::Int(i),
            None => Param::Str(n.to_string()),
        }),
        Value::String(s) => Ok(match digits_as_int(s) {
            Some(i) => Param::Int(i),
            None => Param::Str(s.clone()),
        }),
    }
}

fn digits_as_int(s: &str) -> Option<i64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Build the `INSERT` for `item` into `table`.
///
/// Columns follow the item's iteration order and one `?` placeholder is
/// emitted per column.
pub fn build_insert<C: Connection + ?Sized>(
    connection: &C,
    table: &str,
    item: &WorkItem,
) -> Result<InsertStatement, ValidationError> {
    if table.is_empty() {
        return Err(ValidationError::EmptyTableName);
    }
    if item.is_empty() {
        return Err(ValidationError::EmptyItem);
    }

    let params = bind_params(item)?;
    let columns = item
        .keys()
        .map(|column| connection.quote_identifier(column))
        .collect::<Vec<_>>()
        .join(",");
    let placeholders = vec!["?"; item.len()].join(",");

    Ok(InsertStatement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            connection.quote_identifier(table),
            columns,
            placeholders
        ),
        params,
    })
}

/// Convert a fetched row into the requested shape.
pub fn decode_row(row: Row, style: &FetchStyle) -> Result<Fetched, ProtocolError> {
    match style {
        FetchStyle::Map => Ok(Fetched::Map(row.into_item())),
        FetchStyle::Column(index) => row
            .get_index(*index)
            .cloned()
            .map(Fetched::Column)
            .ok_or_else(|| ProtocolError::Decode {
                message: format!(
                    "column index {} out of range for a row of {} columns",
                    index,
                    row.len()
                ),
            }),
        FetchStyle::Into(template) => {
            let mut target = template.clone();
            for (column, value) in row.into_item() {
                target.insert(column, value);
            }
            Ok(Fetched::Map(target))
        }
    }
}

/// Deserialize a fetched row into a caller-defined type.
pub fn decode_as<T: DeserializeOwned>(row: Row) -> Result<T, ProtocolError> {
    serde_json::from_value(Value::Object(row.into_item())).map_err(|e| ProtocolError::Decode {
        message: e.to_string(),
    })
}
