//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered with the
//! `config` crate, later sources overriding earlier ones:
//!
//! 1. built-in defaults
//! 2. `{dir}/base.yaml` (optional)
//! 3. `{dir}/{environment}.yaml` (optional)
//! 4. `CONTENT_ARCHITECT__SECTION__KEY` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::OrchestrationConfig;
use crate::constants::{
    CONFIG_ENV_PREFIX, CONFIG_ENV_SEPARATOR, DEFAULT_CONFIG_DIRECTORY, ENVIRONMENT_VAR,
};
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Overrides the configuration directory when no explicit one is given
const CONFIG_DIRECTORY_VAR: &str = "CONTENT_ARCHITECT_CONFIG_DIR";

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: OrchestrationConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for tests that must not touch process-wide variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            max_parallel_steps = config.executor.max_parallel_steps,
            broker_enabled = config.broker.enabled,
            "✅ Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(
        config: OrchestrationConfig,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        }))
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// `CONTENT_ARCHITECT_ENV`, then `APP_ENV`, then `development`
    pub fn detect_environment() -> String {
        env::var(ENVIRONMENT_VAR)
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var(CONFIG_DIRECTORY_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_DIRECTORY))
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<OrchestrationConfig> {
        let defaults = Config::try_from(&OrchestrationConfig::default())
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        let base_path = config_directory.join("base.yaml");
        let environment_path = config_directory.join(format!("{environment}.yaml"));

        debug!(
            base = %base_path.display(),
            base_present = base_path.is_file(),
            overrides = %environment_path.display(),
            overrides_present = environment_path.is_file(),
            "Configuration sources"
        );

        Config::builder()
            .add_source(defaults)
            .add_source(File::from(base_path).required(false))
            .add_source(File::from(environment_path).required(false))
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator(CONFIG_ENV_SEPARATOR)
                    .separator(CONFIG_ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .and_then(|merged| merged.try_deserialize::<OrchestrationConfig>())
            .map_err(|e| ConfigurationError::load_error(environment, e))
    }
}
