//! In-memory Q4M provider for testing and development.
//!
//! This module emulates the part of a Q4M-enabled MySQL server that a
//! [`QueueSession`](crate::session::QueueSession) talks to:
//! - `INSERT INTO ... (...) VALUES (?, ...)` into declared tables
//! - `SELECT queue_wait(...)`, `SELECT queue_end()`, `SELECT queue_abort()`
//! - `SELECT * FROM <table>`, which only shows the owned row in owner mode
//!
//! Owner mode is tracked per [`InMemoryConnection`], while the tables live in
//! a shared [`InMemoryQ4m`] store so several connections can compete for rows
//! the way separate MySQL connections do.

use crate::connection::{Connection, Param, Row};
use crate::error::ConnectionError;
use crate::row::WorkItem;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Configuration of the in-memory engine
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// Timeout of `queue_wait()` calls that do not pass one
    pub default_wait_timeout: Duration,
    /// How often a blocked `queue_wait()` re-checks the tables
    pub poll_interval: Duration,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            default_wait_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(10),
        }
    }
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

struct Storage {
    tables: HashMap<String, Table>,
    next_row_id: u64,
    next_connection_id: u64,
    faults: Vec<Fault>,
}

struct Table {
    columns: Vec<String>,
    rows: Vec<StoredRow>,
}

struct StoredRow {
    id: u64,
    values: Vec<Value>,
    owner: Option<u64>,
}

impl Table {
    fn to_row(&self, stored: &StoredRow) -> Row {
        self.columns
            .iter()
            .cloned()
            .zip(stored.values.iter().cloned())
            .collect()
    }
}

struct Fault {
    sql_prefix: String,
    error: ConnectionError,
}

impl Storage {
    fn take_fault(&mut self, sql: &str) -> Option<ConnectionError> {
        let position = self
            .faults
            .iter()
            .position(|f| sql.starts_with(&f.sql_prefix))?;
        Some(self.faults.remove(position).error)
    }

    fn table(&self, name: &str) -> Result<&Table, ConnectionError> {
        self.tables.get(name).ok_or_else(|| missing_table(name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table, ConnectionError> {
        self.tables.get_mut(name).ok_or_else(|| missing_table(name))
    }

    fn remove_row(&mut self, owned: &OwnedRow) {
        if let Some(table) = self.tables.get_mut(&owned.table) {
            table.rows.retain(|row| row.id != owned.row_id);
        }
    }

    fn release_row(&mut self, owned: &OwnedRow) {
        if let Some(table) = self.tables.get_mut(&owned.table) {
            if let Some(row) = table.rows.iter_mut().find(|row| row.id == owned.row_id) {
                row.owner = None;
            }
        }
    }

    /// Lock the first free row of the first table that has one.
    fn try_acquire(&mut self, tables: &[String], connection_id: u64) -> Option<(usize, OwnedRow)> {
        for (index, name) in tables.iter().enumerate() {
            let Some(table) = self.tables.get_mut(name) else {
                continue;
            };
            if let Some(row) = table.rows.iter_mut().find(|row| row.owner.is_none()) {
                row.owner = Some(connection_id);
                return Some((
                    index,
                    OwnedRow {
                        table: name.clone(),
                        row_id: row.id,
                    },
                ));
            }
        }
        None
    }
}

fn missing_table(name: &str) -> ConnectionError {
    ConnectionError::with_code("42S02", format!("Table '{}' doesn't exist", name))
}

fn syntax_error(sql: &str) -> ConnectionError {
    ConnectionError::with_code(
        "42000",
        format!("You have an error in your SQL syntax near '{}'", sql),
    )
}

// ============================================================================
// InMemoryQ4m
// ============================================================================

/// Shared in-memory queue tables.
#[derive(Clone)]
pub struct InMemoryQ4m {
    storage: Arc<Mutex<Storage>>,
    config: InMemoryConfig,
}

impl InMemoryQ4m {
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(Mutex::new(Storage {
                tables: HashMap::new(),
                next_row_id: 1,
                next_connection_id: 1,
                faults: Vec::new(),
            })),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Storage> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new connection with its own owner mode.
    pub fn connect(&self) -> InMemoryConnection {
        let mut storage = self.lock();
        let id = storage.next_connection_id;
        storage.next_connection_id += 1;
        InMemoryConnection {
            id,
            store: self.clone(),
            owned: None,
        }
    }

    /// Create (or replace) a queue table with the given columns.
    pub fn create_table(&self, name: &str, columns: &[&str]) {
        self.lock().tables.insert(
            name.to_string(),
            Table {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
            },
        );
    }

    pub fn drop_table(&self, name: &str) {
        self.lock().tables.remove(name);
    }

    /// Remove every row, including owned ones.
    pub fn truncate(&self, name: &str) {
        if let Some(table) = self.lock().tables.get_mut(name) {
            table.rows.clear();
        }
    }

    /// Number of rows in `name`, owned or not. Unknown tables count as empty.
    pub fn row_count(&self, name: &str) -> usize {
        self.lock()
            .tables
            .get(name)
            .map_or(0, |table| table.rows.len())
    }

    /// Number of rows of `name` no connection currently owns.
    pub fn available_count(&self, name: &str) -> usize {
        self.lock().tables.get(name).map_or(0, |table| {
            table.rows.iter().filter(|row| row.owner.is_none()).count()
        })
    }

    /// Snapshot of the rows of `name` in queue order.
    pub fn rows(&self, name: &str) -> Vec<WorkItem> {
        let storage = self.lock();
        let rows = storage.tables.get(name).map_or_else(Vec::new, |table| {
            table
                .rows
                .iter()
                .map(|row| table.to_row(row).into_item())
                .collect()
        });
        rows
    }

    /// Make the next statement starting with `sql_prefix` fail with `error`.
    pub fn fail_next(&self, sql_prefix: &str, error: ConnectionError) {
        self.lock().faults.push(Fault {
            sql_prefix: sql_prefix.to_string(),
            error,
        });
    }
}

impl Default for InMemoryQ4m {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

// ============================================================================
// InMemoryConnection
// ============================================================================

struct OwnedRow {
    table: String,
    row_id: u64,
}

/// A connection to an [`InMemoryQ4m`] store.
///
/// Dropping the connection while in owner mode returns the owned row to the
/// queue, as a MySQL disconnect does.
pub struct InMemoryConnection {
    id: u64,
    store: InMemoryQ4m,
    owned: Option<OwnedRow>,
}

impl InMemoryConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the engine considers this connection to be in owner mode.
    pub fn in_owner_mode(&self) -> bool {
        self.owned.is_some()
    }

    fn insert(
        &mut self,
        table: &str,
        columns: &[String],
        params: &[Param],
    ) -> Result<u64, ConnectionError> {
        let mut storage = self.store.lock();
        let row_id = storage.next_row_id;
        let target = storage.table_mut(table)?;

        let mut values = vec![Value::Null; target.columns.len()];
        for (column, param) in columns.iter().zip(params) {
            let position = target
                .columns
                .iter()
                .position(|c| c == column)
                .ok_or_else(|| {
                    ConnectionError::with_code(
                        "42S22",
                        format!("Unknown column '{}' in 'field list'", column),
                    )
                })?;
            values[position] = param.to_value();
        }
        target.rows.push(StoredRow {
            id: row_id,
            values,
            owner: None,
        });
        storage.next_row_id += 1;
        Ok(1)
    }

    async fn queue_wait(
        &mut self,
        tables: &[String],
        timeout: Option<u64>,
    ) -> Result<i64, ConnectionError> {
        let timeout = timeout
            .map(Duration::from_secs)
            .unwrap_or(self.store.config.default_wait_timeout);
        // Timeouts too large for the clock never expire.
        let deadline = Instant::now().checked_add(timeout);

        {
            let mut storage = self.store.lock();
            // Re-waiting in owner mode consumes the owned row, even when the
            // wait itself fails.
            if let Some(owned) = self.owned.take() {
                storage.remove_row(&owned);
            }
            for table in tables {
                storage.table(table)?;
            }
        }

        loop {
            let acquired = self.store.lock().try_acquire(tables, self.id);
            if let Some((index, owned)) = acquired {
                self.owned = Some(owned);
                return Ok(index as i64 + 1);
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(0);
            }
            tokio::time::sleep(self.store.config.poll_interval).await;
        }
    }

    fn queue_end(&mut self) -> i64 {
        if let Some(owned) = self.owned.take() {
            self.store.lock().remove_row(&owned);
        }
        1
    }

    fn queue_abort(&mut self) -> Result<i64, ConnectionError> {
        let owned = self.owned.take().ok_or_else(|| {
            ConnectionError::with_code("HY000", "queue_abort(): not in owner mode")
        })?;
        self.store.lock().release_row(&owned);
        Ok(1)
    }

    fn select_all(&self, table: &str) -> Result<Option<Row>, ConnectionError> {
        let storage = self.store.lock();
        let target = storage.table(table)?;

        let row = match &self.owned {
            Some(owned) if owned.table == table => {
                target.rows.iter().find(|row| row.id == owned.row_id)
            }
            _ => target.rows.first(),
        };
        Ok(row.map(|row| target.to_row(row)))
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        if let Some(owned) = self.owned.take() {
            self.store.lock().release_row(&owned);
        }
    }
}

#[async_trait]
impl Connection for InMemoryConnection {
    async fn execute(&mut self, sql: &str, params: &[Param]) -> Result<u64, ConnectionError> {
        debug!(connection = self.id, sql, "Executing statement");
        let fault = self.store.lock().take_fault(sql);
        if let Some(error) = fault {
            return Err(error);
        }

        match parse(sql)? {
            Statement::Insert {
                table,
                columns,
                placeholders,
            } => {
                if placeholders != columns.len() || placeholders != params.len() {
                    return Err(ConnectionError::with_code(
                        "HY093",
                        "Invalid parameter number: number of bound variables does not match number of tokens",
                    ));
                }
                self.insert(&table, &columns, params)
            }
            _ => Err(ConnectionError::with_code(
                "HY000",
                "Statement returns a result set; use query_one",
            )),
        }
    }

    async fn query_one(&mut self, sql: &str) -> Result<Option<Row>, ConnectionError> {
        debug!(connection = self.id, sql, "Running query");
        let fault = self.store.lock().take_fault(sql);
        if let Some(error) = fault {
            return Err(error);
        }

        match parse(sql)? {
            Statement::SelectAll { table } => self.select_all(&table),
            Statement::Wait {
                expression,
                tables,
                timeout,
            } => {
                let index = self.queue_wait(&tables, timeout).await?;
                Ok(Some(Row::new().with_column(expression, index)))
            }
            Statement::End { expression } => {
                let response = self.queue_end();
                Ok(Some(Row::new().with_column(expression, response)))
            }
            Statement::Abort { expression } => {
                let response = self.queue_abort()?;
                Ok(Some(Row::new().with_column(expression, response)))
            }
            Statement::Insert { .. } => Err(ConnectionError::with_code(
                "HY000",
                "Statement does not return a result set",
            )),
        }
    }
}

// ============================================================================
// SQL Parsing
// ============================================================================

#[derive(Debug, PartialEq)]
enum Statement {
    Insert {
        table: String,
        columns: Vec<String>,
        placeholders: usize,
    },
    SelectAll {
        table: String,
    },
    Wait {
        expression: String,
        tables: Vec<String>,
        timeout: Option<u64>,
    },
    End {
        expression: String,
    },
    Abort {
        expression: String,
    },
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &s[prefix.len()..])
}

fn parse(sql: &str) -> Result<Statement, ConnectionError> {
    let sql = sql.trim();

    if let Some(rest) = strip_prefix_ignore_case(sql, "INSERT INTO ") {
        return parse_insert(rest).ok_or_else(|| syntax_error(sql));
    }

    let expression = strip_prefix_ignore_case(sql, "SELECT ")
        .map(str::trim)
        .ok_or_else(|| syntax_error(sql))?;

    if let Some(table) = strip_prefix_ignore_case(expression, "* FROM ") {
        return Ok(Statement::SelectAll {
            table: unquote_identifier(table.trim()).ok_or_else(|| syntax_error(sql))?,
        });
    }
    if expression == "queue_end()" {
        return Ok(Statement::End {
            expression: expression.to_string(),
        });
    }
    if expression == "queue_abort()" {
        return Ok(Statement::Abort {
            expression: expression.to_string(),
        });
    }
    if let Some(arguments) = expression
        .strip_prefix("queue_wait(")
        .and_then(|a| a.strip_suffix(')'))
    {
        let (tables, timeout) = parse_wait_arguments(arguments).ok_or_else(|| syntax_error(sql))?;
        return Ok(Statement::Wait {
            expression: expression.to_string(),
            tables,
            timeout,
        });
    }

    Err(syntax_error(sql))
}

fn parse_insert(rest: &str) -> Option<Statement> {
    let open = find_unquoted(rest, '(')?;
    let table = unquote_identifier(rest[..open].trim())?;

    let after_open = &rest[open + 1..];
    let close = find_unquoted(after_open, ')')?;
    let columns = split_unquoted(&after_open[..close], ',')
        .into_iter()
        .map(|c| unquote_identifier(c.trim()))
        .collect::<Option<Vec<_>>>()?;

    let values = strip_prefix_ignore_case(after_open[close + 1..].trim(), "VALUES")?.trim();
    let placeholders = values.strip_prefix('(')?.strip_suffix(')')?;
    let placeholders = split_unquoted(placeholders, ',');
    if placeholders.iter().any(|p| p.trim() != "?") {
        return None;
    }

    Some(Statement::Insert {
        table,
        columns,
        placeholders: placeholders.len(),
    })
}

fn parse_wait_arguments(arguments: &str) -> Option<(Vec<String>, Option<u64>)> {
    let mut tables = Vec::new();
    let mut timeout = None;

    for argument in split_unquoted(arguments, ',') {
        let argument = argument.trim();
        if timeout.is_some() {
            // The timeout must be the last argument.
            return None;
        }
        if argument.starts_with('\'') {
            tables.push(unquote_literal(argument)?);
        } else {
            timeout = Some(argument.parse().ok()?);
        }
    }

    if tables.is_empty() {
        return None;
    }
    Some((tables, timeout))
}

/// Byte offset of the first `target` outside quotes and backticks.
fn find_unquoted(s: &str, target: char) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (offset, c) in s.char_indices() {
        match quote {
            Some('\'') if escaped => escaped = false,
            Some('\'') if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '`' => quote = Some(c),
            None if c == target => return Some(offset),
            None => {}
        }
    }
    None
}

fn split_unquoted(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(offset) = find_unquoted(rest, separator) {
        parts.push(&rest[..offset]);
        rest = &rest[offset + separator.len_utf8()..];
    }
    parts.push(rest);
    parts
}

/// `` `db`.`table` `` or `db.table` to `db.table`.
fn unquote_identifier(s: &str) -> Option<String> {
    let mut name = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '`' => loop {
                match chars.next()? {
                    '`' if chars.peek() == Some(&'`') => {
                        chars.next();
                        name.push('`');
                    }
                    '`' => break,
                    other => name.push(other),
                }
            },
            c if c.is_whitespace() => return None,
            other => name.push(other),
        }
    }
    (!name.is_empty()).then_some(name)
}

fn unquote_literal(s: &str) -> Option<String> {
    let inner = s.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => value.push(match chars.next()? {
                '0' => '\0',
                'n' => '\n',
                'r' => '\r',
                'Z' => '\x1a',
                other => other,
            }),
            '\'' => {
                // A quote inside a literal must be doubled.
                if chars.next()? != '\'' {
                    return None;
                }
                value.push('\'');
            }
            other => value.push(other),
        }
    }
    Some(value)
}
