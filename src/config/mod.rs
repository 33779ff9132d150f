//! # Worker Configuration System
//!
//! Layered, validated configuration for the worker process. Every value has a
//! compiled default so a worker starts with no files present; files and
//! environment variables only override.
//!
//! ## Layering
//!
//! ```text
//! compiled defaults
//!   -> config/worker.toml                (optional)
//!   -> config/worker.{environment}.toml  (optional)
//!   -> STREAMER_WORKER__SECTION__KEY      (environment variables)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use streamer_worker::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let soft_delay = manager.config().worker.soft_error_delay();
//! let give_up = manager.config().throttle.give_up_threshold;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::{
    DEFAULT_QUEUE_NAME, FOLLOWUP_DELAY, GUARD_CONTENTION_DELAY, GUARD_TTL, HALT_CHECKPOINTS,
    HALT_CHECKPOINT_INTERVAL, INFRA_ERROR_DELAY, SOFT_ERROR_DELAY,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Queue polling and message lifecycle
    pub worker: WorkerSection,

    /// Streamer concurrency guard
    pub throttle: ThrottleConfig,

    /// Report processing follow-ups
    pub report: ReportConfig,

    /// Optional PostgreSQL connection for the pgmq queue backend
    pub database: DatabaseConfig,

    /// Raw report object storage
    pub storage: StorageConfig,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSection {
    pub queue_name: String,
    /// Seconds a receive call waits for a message before returning empty
    pub wait_time_seconds: u64,
    /// Messages fetched per poll; the loop processes them one at a time
    pub max_messages: u32,
    pub visibility_timeout_seconds: u64,
    pub soft_error_delay_seconds: u64,
    pub infra_error_delay_seconds: u64,
    pub halt_checkpoints: u32,
    pub halt_checkpoint_interval_seconds: u64,
    /// Label used in lifecycle notifications, e.g. `worker-1`
    pub server_type: String,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            wait_time_seconds: 20,
            max_messages: 1,
            visibility_timeout_seconds: 600,
            soft_error_delay_seconds: SOFT_ERROR_DELAY.as_secs(),
            infra_error_delay_seconds: INFRA_ERROR_DELAY.as_secs(),
            halt_checkpoints: HALT_CHECKPOINTS,
            halt_checkpoint_interval_seconds: HALT_CHECKPOINT_INTERVAL.as_secs(),
            server_type: "worker".to_string(),
        }
    }
}

impl WorkerSection {
    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_seconds)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }

    pub fn soft_error_delay(&self) -> Duration {
        Duration::from_secs(self.soft_error_delay_seconds)
    }

    pub fn infra_error_delay(&self) -> Duration {
        Duration::from_secs(self.infra_error_delay_seconds)
    }

    pub fn halt_checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.halt_checkpoint_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub ttl_seconds: u64,
    /// Attempt count past which operators start getting notified
    pub escalation_threshold: i64,
    pub notify_every: i64,
    /// Attempt count at which the guard is force-released
    pub give_up_threshold: i64,
    pub retry_delay_seconds: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: GUARD_TTL.as_secs(),
            escalation_threshold: 50,
            notify_every: 50,
            give_up_threshold: 100,
            retry_delay_seconds: GUARD_CONTENTION_DELAY.as_secs(),
        }
    }
}

impl ThrottleConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    pub followup_delay_seconds: u64,
    pub max_report_length: u32,
    pub delay_check_max_attempts: i64,
    pub delay_check_ttl_seconds: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            followup_delay_seconds: FOLLOWUP_DELAY.as_secs(),
            max_report_length: crate::report::DEFAULT_REPORT_MAX_LENGTH,
            delay_check_max_attempts: 5,
            delay_check_ttl_seconds: 36_000,
        }
    }
}

impl ReportConfig {
    pub fn followup_delay(&self) -> Duration {
        Duration::from_secs(self.followup_delay_seconds)
    }

    pub fn delay_check_ttl(&self) -> Duration {
        Duration::from_secs(self.delay_check_ttl_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for the local object store; buckets are subdirectories
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("storage"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Explicit level; falls back to the environment default when unset
    pub level: Option<String>,
    pub json: bool,
}

impl WorkerConfig {
    /// Reject values the worker cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.worker.queue_name.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "worker.queue_name",
                &self.worker.queue_name,
                "queue name cannot be empty",
            ));
        }

        if self.worker.max_messages == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.max_messages",
                "0",
                "at least one message must be fetched per poll",
            ));
        }

        if self.throttle.give_up_threshold <= self.throttle.escalation_threshold {
            return Err(ConfigurationError::validation_error(format!(
                "throttle.give_up_threshold ({}) must be greater than throttle.escalation_threshold ({})",
                self.throttle.give_up_threshold, self.throttle.escalation_threshold
            )));
        }

        if self.throttle.notify_every <= 0 {
            return Err(ConfigurationError::invalid_value(
                "throttle.notify_every",
                self.throttle.notify_every.to_string(),
                "must be positive",
            ));
        }

        for (field, value) in [
            ("throttle.ttl_seconds", self.throttle.ttl_seconds),
            ("report.delay_check_ttl_seconds", self.report.delay_check_ttl_seconds),
        ] {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    "0",
                    "TTL must be greater than zero",
                ));
            }
        }

        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "0",
                "pool needs at least one connection",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.worker.max_messages, 1);
        assert_eq!(config.worker.soft_error_delay(), Duration::from_secs(300));
        assert_eq!(config.throttle.give_up_threshold, 100);
        assert_eq!(config.report.max_report_length, 196_608);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = WorkerConfig::default();
        config.worker.queue_name = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));

        let mut config = WorkerConfig::default();
        config.worker.max_messages = 0;
        assert!(config.validate().is_err());

        let mut config = WorkerConfig::default();
        config.throttle.give_up_threshold = 50;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::ValidationError { .. })
        ));

        let mut config = WorkerConfig::default();
        config.throttle.ttl_seconds = 0;
        assert!(config.validate().is_err());
    }
}
