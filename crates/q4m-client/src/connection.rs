//! Database capability consumed by the queue session.
//!
//! The session only needs to execute a statement with bound parameters, fetch
//! the first row of a query and quote values. Anything that can do that over a
//! MySQL connection with the Q4M engine installed can drive a
//! [`QueueSession`](crate::session::QueueSession).

use crate::error::ConnectionError;
use crate::row::WorkItem;
use async_trait::async_trait;
use serde_json::Value;

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;

/// A single database connection.
///
/// Q4M tracks owner mode per connection, so an implementation must not be
/// shared between sessions.
#[async_trait]
pub trait Connection: Send {
    /// Execute a statement with positional `?` parameters, returning the
    /// number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[Param]) -> Result<u64, ConnectionError>;

    /// Run a query and return its first row, or `None` when the result set
    /// is empty.
    async fn query_one(&mut self, sql: &str) -> Result<Option<Row>, ConnectionError>;

    /// Quote a string literal for inclusion in SQL text.
    fn quote_literal(&self, value: &str) -> String {
        let mut quoted = String::with_capacity(value.len() + 2);
        quoted.push('\'');
        for c in value.chars() {
            match c {
                '\'' => quoted.push_str("\\'"),
                '\\' => quoted.push_str("\\\\"),
                '\0' => quoted.push_str("\\0"),
                '\n' => quoted.push_str("\\n"),
                '\r' => quoted.push_str("\\r"),
                '\x1a' => quoted.push_str("\\Z"),
                other => quoted.push(other),
            }
        }
        quoted.push('\'');
        quoted
    }

    /// Quote a (possibly `database.table` qualified) identifier.
    fn quote_identifier(&self, name: &str) -> String {
        name.split('.')
            .map(|part| format!("`{}`", part.replace('`', "``")))
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[async_trait]
impl<C: Connection + ?Sized> Connection for Box<C> {
    async fn execute(&mut self, sql: &str, params: &[Param]) -> Result<u64, ConnectionError> {
        (**self).execute(sql, params).await
    }

    async fn query_one(&mut self, sql: &str) -> Result<Option<Row>, ConnectionError> {
        (**self).query_one(sql).await
    }

    fn quote_literal(&self, value: &str) -> String {
        (**self).quote_literal(value)
    }

    fn quote_identifier(&self, name: &str) -> String {
        (**self).quote_identifier(name)
    }
}

/// Driver-level type a parameter is bound with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Bool,
    Int,
    Str,
}

/// A value bound to a positional placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Bool(bool),
    Int(i64),
    Str(String),
    Null,
}

impl Param {
    /// Binding type; `NULL` is bound as a string parameter.
    pub fn param_type(&self) -> ParamType {
        match self {
            Self::Bool(_) => ParamType::Bool,
            Self::Int(_) => ParamType::Int,
            Self::Str(_) | Self::Null => ParamType::Str,
        }
    }

    /// The value a row would hold after storing this parameter.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Str(s) => Value::String(s.clone()),
            Self::Null => Value::Null,
        }
    }
}

/// A fetched row: column names with their values, in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column
    pub fn with_column(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((name.into(), value.into()));
    }

    /// Value of the first column with the given name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    /// Value at the given zero-based column position
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.columns.get(index).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Convert into a column-keyed work item, keeping column order.
    pub fn into_item(self) -> WorkItem {
        self.columns.into_iter().collect()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}
