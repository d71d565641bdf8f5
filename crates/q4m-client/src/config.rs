//! Client configuration.
//!
//! Settings are layered from an optional configuration file and `Q4M_*`
//! environment variables, e.g. `Q4M_WAIT_TIMEOUT_SECS=5` or
//! `Q4M_REWAIT_POLICY=reject`.

use crate::error::ConfigurationError;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Default timeout, in seconds, for waits on several tables.
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 1;

/// What to do when a wait is requested while already owning a row.
///
/// Q4M itself consumes the owned row when `queue_wait()` is called again on
/// the same connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewaitPolicy {
    /// Issue the wait anyway; the owned row is consumed by the engine
    #[default]
    Allow,
    /// Fail before issuing any SQL
    Reject,
}

/// Configuration for queue sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `mysql://` URL used by the MySQL provider
    pub database_url: Option<String>,
    /// Timeout passed to `queue_wait()` when waiting on several tables
    pub wait_timeout_secs: u64,
    pub rewait_policy: RewaitPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            wait_timeout_secs: DEFAULT_WAIT_TIMEOUT_SECS,
            rewait_policy: RewaitPolicy::Allow,
        }
    }
}

impl ClientConfig {
    /// Load configuration from an optional file overlaid with `Q4M_*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(Environment::with_prefix("Q4M").try_parsing(true));

        let settings = builder
            .build()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;
        let config: Self = settings
            .try_deserialize()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check the values that cannot be expressed in the type.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if let Some(url) = &self.database_url {
            if !url.starts_with("mysql://") {
                return Err(ConfigurationError::Invalid {
                    message: format!("database_url must be a mysql:// URL, got [{}]", url),
                });
            }
        }
        Ok(())
    }

    /// The database URL, required by providers that open their own connection.
    pub fn require_database_url(&self) -> Result<&str, ConfigurationError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigurationError::Missing {
                key: "database_url".to_string(),
            })
    }
}
