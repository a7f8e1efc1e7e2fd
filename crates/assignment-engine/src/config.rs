use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{EngineError, Result};

/// Assignment engine configuration
///
/// # Configuration Sections
///
/// - [`database`](EngineConfig::database): SQLite location and connection behaviour
/// - [`queue`](EngineConfig::queue): drain batch size and the safety drain timer
/// - [`assignment`](EngineConfig::assignment): selection retries, bulk limits, reassignment policy
/// - [`retry`](EngineConfig::retry): transient contention retry with jittered backoff
///
/// # Examples
///
/// ```
/// use deskroute_assignment_engine::EngineConfig;
///
/// let mut config = EngineConfig::default();
/// assert_eq!(config.queue.drain_batch_size, 10);
///
/// config.queue.drain_batch_size = 0;
/// assert!(config.validate().is_err());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub assignment: AssignmentConfig,
    pub retry: RetryConfig,
}

impl EngineConfig {
    /// Load a JSON configuration file; missing sections keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(EngineError::config("database.url must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(EngineError::config("database.max_connections must be at least 1"));
        }
        if self.queue.drain_batch_size == 0 {
            return Err(EngineError::config("queue.drain_batch_size must be at least 1"));
        }
        if self.assignment.max_selection_attempts == 0 {
            return Err(EngineError::config("assignment.max_selection_attempts must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(EngineError::config("retry.max_attempts must be at least 1"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(EngineError::config("retry.base_delay_ms must not exceed retry.max_delay_ms"));
        }
        Ok(())
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx SQLite URL, e.g. `sqlite:deskroute.db` or `sqlite::memory:`
    pub url: String,

    /// Pool size for file databases. In-memory databases always use one connection.
    pub max_connections: u32,

    /// How long SQLite waits on a locked database before reporting SQLITE_BUSY
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:deskroute.db".to_string(),
            max_connections: 8,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Queue draining configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum entries examined per drain pass
    pub drain_batch_size: u32,

    /// Period of the safety drain loop; 0 disables it
    pub safety_drain_interval_secs: u64,
}

impl QueueConfig {
    pub fn safety_drain_interval(&self) -> Option<Duration> {
        (self.safety_drain_interval_secs > 0).then(|| Duration::from_secs(self.safety_drain_interval_secs))
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            drain_batch_size: 10,
            safety_drain_interval_secs: 30,
        }
    }
}

/// What manual reassignment does when the destination agent is full
///
/// Neither variant blocks the transfer: reassignment is a supervisor override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReassignCapacityPolicy {
    /// Transfer silently
    Allow,
    /// Transfer and log a warning
    Warn,
}

/// Assignment behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Selection + assignment rounds before a ticket falls back to the queue
    pub max_selection_attempts: u32,

    /// Upper bound on holding tickets pulled for a reconnecting agent
    pub bulk_assign_limit: u32,

    pub reassign_capacity_policy: ReassignCapacityPolicy,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            max_selection_attempts: 3,
            bulk_assign_limit: 20,
            reassign_capacity_policy: ReassignCapacityPolicy::Warn,
        }
    }
}

/// Transient contention retry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 20,
            max_delay_ms: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        config.validate().expect("defaults should validate");
        assert_eq!(config.assignment.reassign_capacity_policy, ReassignCapacityPolicy::Warn);
        assert_eq!(config.queue.safety_drain_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{ "queue": { "drain_batch_size": 25 }, "assignment": { "reassign_capacity_policy": "allow" } }"#,
        )
        .unwrap();
        assert_eq!(config.queue.drain_batch_size, 25);
        assert_eq!(config.queue.safety_drain_interval_secs, 30);
        assert_eq!(config.assignment.reassign_capacity_policy, ReassignCapacityPolicy::Allow);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_validate_rejects_inverted_retry_delays() {
        let mut config = EngineConfig::default();
        config.retry.base_delay_ms = 1_000;
        config.retry.max_delay_ms = 10;
        assert!(matches!(config.validate(), Err(EngineError::Configuration(_))));
    }

    #[test]
    fn test_zero_interval_disables_safety_drain() {
        let mut config = EngineConfig::default();
        config.queue.safety_drain_interval_secs = 0;
        assert!(config.queue.safety_drain_interval().is_none());
        assert!(config.database.url.starts_with("sqlite:"));
        assert!(!config.database.is_in_memory());
    }
}
