//! Scripted connection used by unit tests to drive failure paths.

use crate::connection::{Connection, Param, Row};
use crate::error::ConnectionError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;

/// Answers queries and statements from pre-recorded scripts and records every
/// SQL text it receives.
#[derive(Default)]
pub(crate) struct ScriptedConnection {
    pub statements: Vec<String>,
    queries: VecDeque<Result<Option<Row>, ConnectionError>>,
    executes: VecDeque<Result<u64, ConnectionError>>,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next query with a single-column row.
    pub fn respond(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.queries
            .push_back(Ok(Some(Row::new().with_column(column, value))));
        self
    }

    pub fn respond_row(mut self, row: Row) -> Self {
        self.queries.push_back(Ok(Some(row)));
        self
    }

    /// Answer the next query with an empty result set.
    pub fn respond_empty(mut self) -> Self {
        self.queries.push_back(Ok(None));
        self
    }

    pub fn fail_query(mut self, message: &str) -> Self {
        self.queries.push_back(Err(ConnectionError::new(message)));
        self
    }

    pub fn fail_execute(mut self, message: &str) -> Self {
        self.executes.push_back(Err(ConnectionError::new(message)));
        self
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn execute(&mut self, sql: &str, _params: &[Param]) -> Result<u64, ConnectionError> {
        self.statements.push(sql.to_string());
        self.executes.pop_front().unwrap_or(Ok(1))
    }

    async fn query_one(&mut self, sql: &str) -> Result<Option<Row>, ConnectionError> {
        self.statements.push(sql.to_string());
        self.queries
            .pop_front()
            .unwrap_or_else(|| Err(ConnectionError::new(format!("unscripted query: {}", sql))))
    }
}
