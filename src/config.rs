//! Scheduler core configuration.
//!
//! Every section has working defaults, so a TOML file only needs the keys it
//! changes:
//!
//! ```toml
//! [outbox]
//! retry_ceiling = 8
//!
//! [tasks]
//! backoff_initial_ms = 2000
//!
//! [cascade]
//! lookahead_days = 14
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tasks::BackoffPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub outbox: OutboxConfig,
    pub tasks: TaskSchedulerConfig,
    pub cascade: CascadeConfig,
}

impl CoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn with_outbox(mut self, outbox: OutboxConfig) -> Self {
        self.outbox = outbox;
        self
    }

    pub fn with_tasks(mut self, tasks: TaskSchedulerConfig) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_cascade(mut self, cascade: CascadeConfig) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbox.batch_size == 0 || self.tasks.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.outbox.retry_ceiling == 0 {
            return Err(ConfigError::Invalid(
                "outbox.retry_ceiling must be at least 1".into(),
            ));
        }
        if self.tasks.default_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "tasks.default_max_attempts must be at least 1".into(),
            ));
        }
        if self.tasks.backoff_initial_ms > self.tasks.backoff_max_ms {
            return Err(ConfigError::Invalid(
                "tasks.backoff_initial_ms exceeds tasks.backoff_max_ms".into(),
            ));
        }
        Ok(())
    }
}

/// Outbox processor tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    pub poll_interval_ms: u64,
    pub batch_size: usize,
    /// Attempts after which a record is retired undelivered.
    pub retry_ceiling: u32,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            batch_size: 50,
            retry_ceiling: 5,
        }
    }
}

impl OutboxConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_retry_ceiling(mut self, ceiling: u32) -> Self {
        self.retry_ceiling = ceiling;
        self
    }
}

/// Follow-up task scheduler tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSchedulerConfig {
    pub poll_interval_ms: u64,
    pub batch_size: usize,
    /// Max attempts given to tasks created without an explicit budget.
    pub default_max_attempts: u32,
    /// How long a claim may stay in progress before other workers may take it.
    pub claim_lease_secs: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for TaskSchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            batch_size: 20,
            default_max_attempts: 3,
            claim_lease_secs: 300,
            backoff_initial_ms: 1_000,
            backoff_max_ms: 300_000,
        }
    }
}

impl TaskSchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease_secs)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::Exponential {
            initial: Duration::from_millis(self.backoff_initial_ms),
            max: Duration::from_millis(self.backoff_max_ms),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_default_max_attempts(mut self, attempts: u32) -> Self {
        self.default_max_attempts = attempts;
        self
    }

    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease_secs = lease.as_secs();
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.backoff_initial_ms = initial.as_millis() as u64;
        self.backoff_max_ms = max.as_millis() as u64;
        self
    }
}

/// Cascade engine tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    pub lock_timeout_ms: u64,
    /// Lifetime of a lock row; a cascade renews it once more before committing.
    pub lock_ttl_secs: u64,
    pub lock_retry_interval_ms: u64,
    /// Days past an appointment's own day searched for a free slot.
    pub lookahead_days: u32,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            lock_ttl_secs: 30,
            lock_retry_interval_ms: 50,
            lookahead_days: 30,
        }
    }
}

impl CascadeConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_lock_retry_interval(mut self, interval: Duration) -> Self {
        self.lock_retry_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_lookahead_days(mut self, days: u32) -> Self {
        self.lookahead_days = days;
        self
    }
}
