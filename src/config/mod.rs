//! # Orchestration Configuration
//!
//! Typed configuration for the executor, job store, notification hub, broker,
//! callbacks and template loading. Every field has a working default so an
//! empty configuration directory yields a runnable system.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use content_architect::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let timeout = manager.config().executor.default_step_timeout();
//! # let _ = timeout;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    pub executor: ExecutorConfig,
    pub jobs: JobsConfig,
    pub notifications: NotificationsConfig,
    pub broker: BrokerConfig,
    pub callbacks: CallbacksConfig,
    pub workflows: WorkflowsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub default_step_timeout_ms: u64,
    /// Bound on the default timeout; timeouts declared on a step are not capped
    pub max_step_timeout_ms: u64,
    /// Upper bound on independent steps run concurrently within one job
    pub max_parallel_steps: usize,
    pub step_retry: StepRetryConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_step_timeout_ms: 30_000,
            max_step_timeout_ms: 300_000,
            max_parallel_steps: 1,
            step_retry: StepRetryConfig::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn default_step_timeout(&self) -> Duration {
        Duration::from_millis(self.default_step_timeout_ms)
    }

    pub fn max_step_timeout(&self) -> Duration {
        Duration::from_millis(self.max_step_timeout_ms)
    }

    /// Effective timeout for a step. A declared timeout is used as given;
    /// otherwise the default applies, bounded by the configured maximum.
    pub fn step_timeout(&self, requested: Option<Duration>) -> Duration {
        requested.unwrap_or_else(|| self.default_step_timeout().min(self.max_step_timeout()))
    }
}

/// In-run retry policy for steps marked `retryable`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepRetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for StepRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl StepRetryConfig {
    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay_ms = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(delay_ms.min(self.max_delay_ms as f64) as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub default_max_retries: u32,
    /// Terminal jobs older than this are removed by the cleanup sweep
    pub retention_hours: u64,
    pub cleanup_interval_seconds: u64,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            default_max_retries: 3,
            retention_hours: 168,
            cleanup_interval_seconds: 3_600,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl JobsConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3_600)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub idle_timeout_seconds: u64,
    pub reap_interval_seconds: u64,
    pub send_timeout_ms: u64,
    /// Buffer size of each connection's delivery channel
    pub channel_capacity: usize,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: 300,
            reap_interval_seconds: 60,
            send_timeout_ms: 1_000,
            channel_capacity: 256,
        }
    }
}

impl NotificationsConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_seconds)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// When disabled every submission runs inline
    pub enabled: bool,
    pub queue_capacity: usize,
    pub worker_count: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 1_024,
            worker_count: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbacksConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for CallbacksConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 250,
        }
    }
}

impl CallbacksConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowsConfig {
    /// Directory of YAML workflow templates loaded at bootstrap
    pub template_directory: Option<PathBuf>,
    pub load_builtin_templates: bool,
}

impl Default for WorkflowsConfig {
    fn default() -> Self {
        Self {
            template_directory: None,
            load_builtin_templates: true,
        }
    }
}

impl OrchestrationConfig {
    /// Validate configuration for consistency and required values
    pub fn validate(&self) -> ConfigResult<()> {
        let executor = &self.executor;
        if executor.default_step_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "executor.default_step_timeout_ms",
                "0",
                "step timeout must be greater than 0",
            ));
        }

        if executor.max_step_timeout_ms < executor.default_step_timeout_ms {
            return Err(ConfigurationError::invalid_value(
                "executor.max_step_timeout_ms",
                executor.max_step_timeout_ms.to_string(),
                "must not be lower than executor.default_step_timeout_ms",
            ));
        }

        if executor.max_parallel_steps == 0 {
            return Err(ConfigurationError::invalid_value(
                "executor.max_parallel_steps",
                "0",
                "at least one step must be allowed to run",
            ));
        }

        let retry = &executor.step_retry;
        if retry.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "executor.step_retry.max_attempts",
                "0",
                "attempt count includes the first attempt and must be at least 1",
            ));
        }

        if retry.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "executor.step_retry.backoff_multiplier",
                retry.backoff_multiplier.to_string(),
                "backoff multiplier must be at least 1.0",
            ));
        }

        if retry.max_delay_ms < retry.base_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "executor.step_retry.max_delay_ms",
                retry.max_delay_ms.to_string(),
                "must not be lower than executor.step_retry.base_delay_ms",
            ));
        }

        let jobs = &self.jobs;
        if jobs.default_page_size == 0 || jobs.default_page_size > jobs.max_page_size {
            return Err(ConfigurationError::invalid_value(
                "jobs.default_page_size",
                jobs.default_page_size.to_string(),
                format!("must be between 1 and jobs.max_page_size ({})", jobs.max_page_size),
            ));
        }

        if jobs.cleanup_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "jobs.cleanup_interval_seconds",
                "0",
                "cleanup interval must be greater than 0",
            ));
        }

        let notifications = &self.notifications;
        if notifications.reap_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "notifications.reap_interval_seconds",
                "0",
                "reap interval must be greater than 0",
            ));
        }

        if notifications.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "notifications.channel_capacity",
                "0",
                "channel capacity must be greater than 0",
            ));
        }

        if self.broker.enabled {
            if self.broker.queue_capacity == 0 {
                return Err(ConfigurationError::invalid_value(
                    "broker.queue_capacity",
                    "0",
                    "queue capacity must be greater than 0",
                ));
            }
            if self.broker.worker_count == 0 {
                return Err(ConfigurationError::missing_required_field(
                    "broker.worker_count",
                    "an enabled broker needs at least one worker",
                ));
            }
        }

        if self.callbacks.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "callbacks.max_attempts",
                "0",
                "at least one delivery attempt is required",
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
        let config = OrchestrationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.executor.default_step_timeout(), Duration::from_secs(30));
        assert_eq!(config.jobs.retention(), Duration::from_secs(168 * 3_600));
        assert!(config.workflows.load_builtin_templates);
    }

    #[test]
    fn test_declared_step_timeout_is_used_as_given() {
        let executor = ExecutorConfig::default();
        assert_eq!(executor.step_timeout(None), Duration::from_secs(30));
        assert_eq!(
            executor.step_timeout(Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            executor.step_timeout(Some(Duration::from_secs(3_600))),
            Duration::from_secs(3_600)
        );
    }

    #[test]
    fn test_default_step_timeout_is_bounded_by_max() {
        // bypasses validate(), which would reject max below default
        let executor = ExecutorConfig {
            default_step_timeout_ms: 60_000,
            max_step_timeout_ms: 10_000,
            ..ExecutorConfig::default()
        };
        assert_eq!(executor.step_timeout(None), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_delay_grows_and_caps() {
        let retry = StepRetryConfig::default();
        assert_eq!(retry.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(retry.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(retry.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(retry.backoff_delay(20), Duration::from_millis(5_000));
    }

    #[test]
    fn test_validation_rejects_inconsistent_values() {
        let mut config = OrchestrationConfig::default();
        config.executor.max_parallel_steps = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));

        let mut config = OrchestrationConfig::default();
        config.jobs.default_page_size = 500;
        assert!(config.validate().is_err());

        let mut config = OrchestrationConfig::default();
        config.broker.worker_count = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingRequiredField { .. })
        ));

        config.broker.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: OrchestrationConfig = serde_yaml::from_str(
            "executor:\n  max_parallel_steps: 4\nbroker:\n  enabled: false\n",
        )
        .unwrap();
        assert_eq!(config.executor.max_parallel_steps, 4);
        assert_eq!(config.executor.default_step_timeout_ms, 30_000);
        assert!(!config.broker.enabled);
        assert_eq!(config.broker.worker_count, 2);
    }
}
