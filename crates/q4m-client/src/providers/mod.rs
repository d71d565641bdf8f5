//! Database connection providers.
//!
//! This module contains concrete implementations of the
//! [`Connection`](crate::connection::Connection) trait.

pub mod memory;
#[cfg(feature = "mysql")]
pub mod mysql;

pub use memory::{InMemoryConfig, InMemoryConnection, InMemoryQ4m};
#[cfg(feature = "mysql")]
pub use mysql::MySqlConnection;
