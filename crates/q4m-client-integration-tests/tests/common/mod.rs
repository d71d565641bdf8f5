//! Common test utilities for q4m-client integration tests
//!
//! This module provides:
//! - An in-memory Q4M store with the `t` fixture table
//! - Work item builders
//! - Tracing setup controlled by `RUST_LOG`

use q4m_client::{InMemoryConfig, InMemoryConnection, InMemoryQ4m, QueueSession, WorkItem};
use serde_json::Value;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Fixture table used by the scenarios.
pub const TABLE: &str = "t";

/// Second fixture table, lower priority than [`TABLE`].
pub const LOW_PRIORITY_TABLE: &str = "t_low";

/// Columns shared by the fixture tables.
pub const COLUMNS: &[&str] = &["id", "message", "priority"];

/// Install a test tracing subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Store with both fixture tables and a short wait timeout.
pub fn create_store() -> InMemoryQ4m {
    init_tracing();

    let store = InMemoryQ4m::new(InMemoryConfig {
        default_wait_timeout: Duration::from_millis(100),
        poll_interval: Duration::from_millis(5),
    });
    store.create_table(TABLE, COLUMNS);
    store.create_table(LOW_PRIORITY_TABLE, COLUMNS);
    store
}

/// Session on a fresh connection of `store`.
pub fn create_session(store: &InMemoryQ4m) -> QueueSession<InMemoryConnection> {
    QueueSession::new(store.connect())
}

/// Work item built from a JSON object literal.
pub fn item(value: Value) -> WorkItem {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// The `{id, message, priority}` item used throughout the scenarios.
pub fn job(id: i64, message: &str, priority: i64) -> WorkItem {
    item(serde_json::json!({
        "id": id,
        "message": message,
        "priority": priority,
    }))
}
