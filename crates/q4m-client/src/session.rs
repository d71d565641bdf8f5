//! Queue session: the Q4M owner-mode state machine.
//!
//! A session is either idle or owning exactly one row of one table. Ownership
//! is obtained with `queue_wait()` and released with `queue_end()` (row
//! removed) or `queue_abort()` (row returned to the queue). While owning, a
//! `SELECT` on the waited table only shows the owned row, which is what
//! [`QueueSession::dequeue`] reads.
//!
//! ```text
//!            wait_single_table / wait_plural_tables
//!   IDLE  ───────────────────────────────────────────▶  OWNING(table)
//!    ▲                                                      │
//!    └───────────────────── end / abort ───────────────────┘
//! ```

use crate::config::{ClientConfig, RewaitPolicy};
use crate::connection::{Connection, Row};
use crate::error::{ProtocolError, QueueError, ValidationError};
use crate::row::{build_insert, decode_as, decode_row, FetchStyle, Fetched, WorkItem};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

const QUEUE_END: &str = "queue_end()";
const QUEUE_ABORT: &str = "queue_abort()";

/// A Q4M client bound to one database connection.
///
/// The session is owning if and only if [`waiting_table`](Self::waiting_table)
/// is set.
pub struct QueueSession<C> {
    connection: C,
    waiting_table: Option<String>,
    config: ClientConfig,
}

impl<C: Connection> QueueSession<C> {
    /// Create an idle session with the default configuration.
    pub fn new(connection: C) -> Self {
        Self::with_config(connection, ClientConfig::default())
    }

    pub fn with_config(connection: C, config: ClientConfig) -> Self {
        Self {
            connection,
            waiting_table: None,
            config,
        }
    }

    /// Create a session in a given state, for connections whose owner mode
    /// is arranged by the test itself.
    #[cfg(any(test, feature = "test-util"))]
    pub fn with_state(connection: C, waiting_table: Option<String>) -> Self {
        Self {
            connection,
            waiting_table,
            config: ClientConfig::default(),
        }
    }

    /// Whether the session currently owns a row.
    pub fn is_owner(&self) -> bool {
        self.waiting_table.is_some()
    }

    /// The table the owned row belongs to.
    pub fn waiting_table(&self) -> Option<&str> {
        self.waiting_table.as_deref()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Give the connection back. Owner mode, if any, stays with the
    /// connection.
    pub fn into_inner(self) -> C {
        self.connection
    }

    /// Insert `item` as a new row of `table`.
    ///
    /// Valid in any state and never changes it.
    #[instrument(skip(self, item), fields(columns = item.len()))]
    pub async fn enqueue(&mut self, table: &str, item: &WorkItem) -> Result<(), QueueError> {
        let statement = build_insert(&self.connection, table, item)?;

        debug!(sql = %statement.sql, "Enqueueing row");
        self.connection
            .execute(&statement.sql, &statement.params)
            .await
            .map_err(|source| ProtocolError::Execution {
                sql: statement.sql.clone(),
                source,
            })?;

        Ok(())
    }

    /// Wait for a row of `table` and take ownership of it.
    #[instrument(skip(self))]
    pub async fn wait_single_table(&mut self, table: &str) -> Result<(), QueueError> {
        if table.is_empty() {
            return Err(ValidationError::EmptyTableName.into());
        }
        self.check_rewait()?;

        let function = format!("queue_wait({})", self.connection.quote_literal(table));
        let response = self.call_function(&function).await?;
        if response != "1" {
            return Err(ProtocolError::IncorrectResponse { function, response }.into());
        }

        self.take_ownership(table);
        Ok(())
    }

    /// Wait on several tables in priority order and take ownership of a row
    /// of the first one that has a row available.
    ///
    /// Returns the selected table.
    #[instrument(skip(self, tables), fields(tables = tables.len()))]
    pub async fn wait_plural_tables<S: AsRef<str>>(
        &mut self,
        tables: &[S],
        timeout_secs: u64,
    ) -> Result<String, QueueError> {
        if tables.is_empty() {
            return Err(ValidationError::NoTables.into());
        }
        if tables.iter().any(|t| t.as_ref().is_empty()) {
            return Err(ValidationError::EmptyTableName.into());
        }
        self.check_rewait()?;

        let arguments = tables
            .iter()
            .map(|t| self.connection.quote_literal(t.as_ref()))
            .collect::<Vec<_>>()
            .join(",");
        let function = format!("queue_wait({},{})", arguments, timeout_secs);
        let response = self.call_function(&function).await?;

        let index: usize = response
            .parse()
            .map_err(|_| ProtocolError::IncorrectResponse {
                function: function.clone(),
                response: response.clone(),
            })?;
        if index == 0 || index > tables.len() {
            return Err(ProtocolError::NoTableAvailable {
                tables: tables.iter().map(|t| t.as_ref().to_string()).collect(),
                response,
            }
            .into());
        }

        let table = tables[index - 1].as_ref().to_string();
        self.take_ownership(&table);
        Ok(table)
    }

    /// [`wait_plural_tables`](Self::wait_plural_tables) with the configured
    /// timeout.
    pub async fn wait_plural_tables_default<S: AsRef<str>>(
        &mut self,
        tables: &[S],
    ) -> Result<String, QueueError> {
        let timeout = self.config.wait_timeout_secs;
        self.wait_plural_tables(tables, timeout).await
    }

    /// Read the owned row as fetched from the database.
    #[instrument(skip(self), fields(table = ?self.waiting_table))]
    pub async fn dequeue_row(&mut self) -> Result<Row, QueueError> {
        let table = self
            .waiting_table
            .as_deref()
            .ok_or(ProtocolError::NotOwner {
                operation: "dequeue",
            })?;

        let sql = format!("SELECT * FROM {}", self.connection.quote_identifier(table));
        debug!(sql = %sql, "Dequeueing row");
        let row = self
            .connection
            .query_one(&sql)
            .await
            .map_err(|source| ProtocolError::Execution {
                sql: sql.clone(),
                source,
            })?;

        row.ok_or_else(|| ProtocolError::FetchFailed { sql }.into())
    }

    /// Read the owned row in the requested shape.
    ///
    /// Does not release ownership.
    pub async fn dequeue(&mut self, style: &FetchStyle) -> Result<Fetched, QueueError> {
        let row = self.dequeue_row().await?;
        Ok(decode_row(row, style)?)
    }

    /// Read the owned row deserialized into `T`.
    pub async fn dequeue_as<T: DeserializeOwned>(&mut self) -> Result<T, QueueError> {
        let row = self.dequeue_row().await?;
        Ok(decode_as(row)?)
    }

    /// Finish the owned row, removing it from the queue.
    #[instrument(skip(self), fields(table = ?self.waiting_table))]
    pub async fn end(&mut self) -> Result<(), QueueError> {
        self.terminate(QUEUE_END, "end").await
    }

    /// Release the owned row, returning it to the queue.
    #[instrument(skip(self), fields(table = ?self.waiting_table))]
    pub async fn abort(&mut self) -> Result<(), QueueError> {
        self.terminate(QUEUE_ABORT, "abort").await
    }

    async fn terminate(
        &mut self,
        function: &str,
        operation: &'static str,
    ) -> Result<(), QueueError> {
        if !self.is_owner() {
            return Err(ProtocolError::NotOwner { operation }.into());
        }

        let response = self.call_function(function).await?;
        if response != "1" {
            return Err(ProtocolError::IncorrectResponse {
                function: function.to_string(),
                response,
            }
            .into());
        }

        let table = self.waiting_table.take();
        info!(table = ?table, function, "Released queue ownership");
        Ok(())
    }

    /// Apply the rewait policy before a wait is issued.
    ///
    /// Under `Allow` the session drops to idle first: the engine consumes the
    /// owned row as soon as the wait runs, whatever the wait returns.
    fn check_rewait(&mut self) -> Result<(), ProtocolError> {
        let Some(table) = self.waiting_table.as_deref() else {
            return Ok(());
        };

        match self.config.rewait_policy {
            RewaitPolicy::Allow => {
                warn!(
                    table,
                    "Waiting while already owning a row; the owned row will be consumed"
                );
                let table = self.waiting_table.take();
                info!(table = ?table, "Released queue ownership for rewait");
                Ok(())
            }
            RewaitPolicy::Reject => Err(ProtocolError::AlreadyOwning {
                table: table.to_string(),
            }),
        }
    }

    fn take_ownership(&mut self, table: &str) {
        info!(table, "Acquired queue ownership");
        self.waiting_table = Some(table.to_string());
    }

    /// Run `SELECT <function>` and return the function's value as text.
    async fn call_function(&mut self, function: &str) -> Result<String, ProtocolError> {
        let sql = format!("SELECT {}", function);
        debug!(sql = %sql, "Calling queue function");

        let row = self
            .connection
            .query_one(&sql)
            .await
            .map_err(|source| ProtocolError::Execution {
                sql: sql.clone(),
                source,
            })?;

        let missing = || ProtocolError::MissingResponse {
            function: function.to_string(),
        };
        let row = row.ok_or_else(missing)?;
        match row.get(function) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(Value::Bool(b)) => Ok(if *b { "1" } else { "0" }.to_string()),
            Some(Value::Null) | Some(Value::Array(_)) | Some(Value::Object(_)) | None => {
                Err(missing())
            }
        }
    }
}
