//! Error types for queue operations.
//!
//! The [`QueueSession`](crate::session::QueueSession) reports granular errors
//! through [`QueueError`]. The workflow wrappers re-wrap them with context in
//! [`ConsumerError`] and [`SubscriberError`].

use thiserror::Error;

/// Error reported by a database [`Connection`](crate::connection::Connection).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code: {})", .code.as_deref().unwrap_or("none"))]
pub struct ConnectionError {
    pub code: Option<String>,
    pub message: String,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

/// Umbrella error returned by the queue session.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl QueueError {
    /// True when the failure was detected before any SQL was issued.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

/// Caller-supplied data violates a local precondition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("The parameter is empty")]
    EmptyItem,

    #[error("The parameter must be primitive. key=[{key}]")]
    NonScalarValue { key: String },

    #[error("At least one table is required to wait on")]
    NoTables,

    #[error("Table name must not be empty")]
    EmptyTableName,
}

/// The queue engine's SQL-level contract was violated or execution failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Must execute any wait function before {operation}")]
    NotOwner { operation: &'static str },

    #[error("Already owning a row of table [{table}]")]
    AlreadyOwning { table: String },

    #[error("Failed to execute SQL. sql=[{sql}]: {source}")]
    Execution {
        sql: String,
        #[source]
        source: ConnectionError,
    },

    #[error("Failed to fetch the response of {function}")]
    MissingResponse { function: String },

    #[error("Response is incorrect. function=[{function}], response=[{response}]")]
    IncorrectResponse { function: String, response: String },

    #[error("No table available. tables=[{}], response=[{response}]", .tables.join(","))]
    NoTableAvailable {
        tables: Vec<String>,
        response: String,
    },

    #[error("Failed to fetch a row. sql=[{sql}]")]
    FetchFailed { sql: String },

    #[error("Failed to decode the fetched row: {message}")]
    Decode { message: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

/// Failure of a [`Consumer`](crate::consumer::Consumer) workflow step.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Failed to consume. table=[{table}], style=[{style}]")]
    Consume {
        table: String,
        style: String,
        #[source]
        source: QueueError,
    },

    #[error("Failed to end")]
    End {
        #[source]
        source: QueueError,
    },

    #[error("Failed to abort")]
    Abort {
        #[source]
        source: QueueError,
    },

    #[error("Nothing to retry: no item has been consumed")]
    NothingToRetry,

    #[error("Failed to retry. queue=[{item}]")]
    Retry {
        item: String,
        #[source]
        source: QueueError,
    },
}

/// Failure of a [`Subscriber`](crate::subscriber::Subscriber) enqueue.
#[derive(Debug, Error)]
#[error("Failed to subscribe. table=[{table}], queue=[{item}]")]
pub struct SubscriberError {
    pub table: String,
    pub item: String,
    #[source]
    pub source: QueueError,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
