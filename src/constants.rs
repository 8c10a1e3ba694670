//! # Constants
//!
//! Names and defaults shared across modules.

/// Workflow type used when a request does not name one
pub const DEFAULT_WORKFLOW_TYPE: &str = "standard";

/// Retry budget for jobs created without an explicit one
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Environment variable selecting the configuration environment
pub const ENVIRONMENT_VAR: &str = "CONTENT_ARCHITECT_ENV";

/// Prefix for configuration overrides, e.g. `CONTENT_ARCHITECT__JOBS__RETENTION_HOURS`
pub const CONFIG_ENV_PREFIX: &str = "CONTENT_ARCHITECT";

/// Separator between prefix, section and key in configuration overrides
pub const CONFIG_ENV_SEPARATOR: &str = "__";

/// Default directory searched for configuration files
pub const DEFAULT_CONFIG_DIRECTORY: &str = "config";

/// File extensions recognised as workflow templates
pub const TEMPLATE_EXTENSIONS: [&str; 2] = ["yaml", "yml"];
