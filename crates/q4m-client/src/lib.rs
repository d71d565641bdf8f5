//! # Q4M Client
//!
//! Client for Q4M, the MySQL storage engine that turns ordinary tables into
//! queues driven by the `queue_wait()`, `queue_end()` and `queue_abort()` SQL
//! functions.
//!
//! This library provides:
//! - A queue session tracking per-connection owner mode
//! - Row encoding for enqueue and decoding for dequeue
//! - A consumer workflow with end, abort and retry
//! - A subscriber for producers
//! - An in-memory Q4M engine for tests, and a MySQL provider behind the
//!   `mysql` feature
//!
//! ## Module Organization
//!
//! - [`session`] - The owner-mode state machine
//! - [`consumer`] - Consume/end/abort/retry workflow
//! - [`subscriber`] - Enqueue wrapper for producers
//! - [`row`] - Insert building, parameter binding and row decoding
//! - [`connection`] - Database capability trait
//! - [`providers`] - Connection implementations
//! - [`config`] - Client configuration
//! - [`error`] - Error types

pub mod config;
pub mod connection;
pub mod consumer;
pub mod error;
pub mod providers;
pub mod row;
pub mod session;
pub mod subscriber;

#[cfg(test)]
mod test_support;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use config::{ClientConfig, RewaitPolicy};
pub use connection::{Connection, Param, ParamType, Row};
pub use consumer::Consumer;
pub use error::{
    ConfigurationError, ConnectionError, ConsumerError, ProtocolError, QueueError,
    SubscriberError, ValidationError,
};
pub use providers::{InMemoryConfig, InMemoryConnection, InMemoryQ4m};
#[cfg(feature = "mysql")]
pub use providers::MySqlConnection;
pub use row::{FetchStyle, Fetched, WorkItem};
pub use session::QueueSession;
pub use subscriber::Subscriber;
