//! # Order Lifecycle Configuration
//!
//! Typed configuration for the lifecycle core, the task queue and the worker.
//!
//! Values come from three layers, later layers winning:
//!
//! 1. Built-in defaults (every field has one)
//! 2. `order-lifecycle.toml` and `order-lifecycle.{environment}.toml` in the config directory
//! 3. Environment variables such as `ORDER_LIFECYCLE__QUEUE__MAX_RETRY=5`
//!
//! ```rust,no_run
//! use order_lifecycle::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let retries = manager.config().queue.max_retry;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub executor: ExecutorConfig,
    pub worker: WorkerConfig,
}

impl LifecycleConfig {
    /// Reject values that would make the system misbehave at runtime
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                self.database.max_connections,
                "must be at least 1",
            ));
        }
        if self.queue.name.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "queue.name",
                &self.queue.name,
                "must not be empty",
            ));
        }
        if self.queue.enqueue_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.enqueue_timeout_ms",
                self.queue.enqueue_timeout_ms,
                "must be greater than zero",
            ));
        }
        if self.worker.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.batch_size",
                self.worker.batch_size,
                "must be at least 1",
            ));
        }
        if self.worker.visibility_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.visibility_timeout_seconds",
                self.worker.visibility_timeout_seconds,
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    /// Apply migrations on startup
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/order_lifecycle_development".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_seconds: 5,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    pub name: String,
    /// Redeliveries per task after the first failure
    pub max_retry: u32,
    /// Hours a finished task is kept
    pub retention_hours: u64,
    /// Upper bound on a single enqueue call during dispatch
    pub enqueue_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "order_lifecycle_tasks".to_string(),
            max_retry: 3,
            retention_hours: 24,
            enqueue_timeout_ms: 2_000,
        }
    }
}

impl QueueConfig {
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Extra passes over pending siblings after a partial multi-order commit
    pub compensation_retries: u32,
    pub compensation_backoff_ms: u64,
    /// Bulk orders may only ship once the final payment is confirmed
    pub require_final_payment_before_delivery: bool,
    /// A scheduled task firing further than this from the order's current
    /// schedule has been superseded
    pub schedule_drift_tolerance_seconds: i64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            compensation_retries: 3,
            compensation_backoff_ms: 50,
            require_final_payment_before_delivery: true,
            schedule_drift_tolerance_seconds: 5,
        }
    }
}

impl ExecutorConfig {
    pub fn compensation_backoff(&self) -> Duration {
        Duration::from_millis(self.compensation_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    pub visibility_timeout_seconds: u64,
    /// Base delay before a failed task is redelivered; doubles per attempt
    pub retry_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval_ms: 500,
            visibility_timeout_seconds: 30,
            retry_backoff_ms: 1_000,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }

    /// Exponential backoff for redelivery of attempt `attempt` (1-based), capped at one hour
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor)).min(Duration::from_secs(3600))
    }
}
