//! MySQL provider backed by `sqlx`.
//!
//! The server must have the Q4M storage engine installed for the queue
//! functions to exist.

use crate::connection::{Connection, Param, Row};
use crate::error::ConnectionError;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::MySqlRow;
use sqlx::{Column as _, Connection as _, Row as _, ValueRef as _};
use tracing::debug;

#[cfg(test)]
#[path = "mysql_tests.rs"]
mod tests;

/// A single MySQL connection.
pub struct MySqlConnection {
    inner: sqlx::MySqlConnection,
}

impl MySqlConnection {
    /// Connect to a `mysql://` URL.
    pub async fn connect(url: &str) -> Result<Self, ConnectionError> {
        let inner = sqlx::MySqlConnection::connect(url)
            .await
            .map_err(to_connection_error)?;
        Ok(Self { inner })
    }

    /// Wrap an already established `sqlx` connection.
    pub fn from_inner(inner: sqlx::MySqlConnection) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> sqlx::MySqlConnection {
        self.inner
    }

    /// Close the connection. The server aborts any owned row.
    pub async fn close(self) -> Result<(), ConnectionError> {
        self.inner.close().await.map_err(to_connection_error)
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    async fn execute(&mut self, sql: &str, params: &[Param]) -> Result<u64, ConnectionError> {
        debug!(sql, params = params.len(), "Executing statement");
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                Param::Bool(b) => query.bind(*b),
                Param::Int(i) => query.bind(*i),
                Param::Str(s) => query.bind(s.clone()),
                Param::Null => query.bind(Option::<String>::None),
            };
        }

        let result = query
            .execute(&mut self.inner)
            .await
            .map_err(to_connection_error)?;
        Ok(result.rows_affected())
    }

    async fn query_one(&mut self, sql: &str) -> Result<Option<Row>, ConnectionError> {
        debug!(sql, "Running query");
        let row = sqlx::query(sql)
            .fetch_optional(&mut self.inner)
            .await
            .map_err(to_connection_error)?;

        row.as_ref().map(convert_row).transpose()
    }
}

fn to_connection_error(error: sqlx::Error) -> ConnectionError {
    match &error {
        sqlx::Error::Database(database) => ConnectionError {
            code: database.code().map(|code| code.into_owned()),
            message: database.message().to_string(),
        },
        other => ConnectionError::new(other.to_string()),
    }
}

fn convert_row(row: &MySqlRow) -> Result<Row, ConnectionError> {
    let mut converted = Row::new();
    for column in row.columns() {
        let value = decode_value(row, column.ordinal())?;
        converted.push(column.name(), value);
    }
    Ok(converted)
}

/// Decode a column into the closest JSON value.
fn decode_value(row: &MySqlRow, index: usize) -> Result<Value, ConnectionError> {
    if row
        .try_get_raw(index)
        .map_err(to_connection_error)?
        .is_null()
    {
        return Ok(Value::Null);
    }

    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Ok(Value::from(v));
    }
    if let Ok(v) = row.try_get::<u64, _>(index) {
        return Ok(Value::from(v));
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Ok(Value::from(v));
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Ok(Value::String(v));
    }

    // DECIMAL, DATETIME and friends arrive as text.
    row.try_get_unchecked::<String, _>(index)
        .map(Value::String)
        .map_err(to_connection_error)
}
