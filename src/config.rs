//! Configuration management for Tollgate.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TollgateError};
use crate::ratelimit::{LimitPolicies, Operation, OperationTable, QuotaDescriptor};

/// Prefix for environment variable overrides (`TOLLGATE_LOGGING__LEVEL=debug`).
const ENV_PREFIX: &str = "TOLLGATE";

/// Main configuration for Tollgate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Explicit quota descriptors. When set, the remote fetch is skipped.
    #[serde(default)]
    pub limits: Option<Vec<QuotaDescriptor>>,

    /// Per-operation weight overrides merged over the built-in table
    #[serde(default)]
    pub weights: HashMap<String, Operation>,
}

/// The subset of [`TollgateConfig`] read through the `config` layers.
#[derive(Debug, Default, Deserialize)]
struct LayeredConfig {
    #[serde(default)]
    logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl TollgateConfig {
    /// Load configuration from an optional YAML file layered with
    /// `TOLLGATE_*` environment variables.
    ///
    /// Only `logging` takes environment overrides. The `config` crate
    /// lowercases keys, which would mangle operation names and the
    /// camelCase descriptor fields, so `limits` and `weights` come straight
    /// from the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        let mut file_config = Self::default();

        if let Some(path) = path {
            if !path.exists() {
                return Err(TollgateError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            info!(path = %path.display(), "Loading configuration");
            file_config = Self::from_file(path)?;
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Yaml));
        }

        let layered: LayeredConfig = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        Ok(Self {
            logging: layered.logging,
            ..file_config
        })
    }

    /// Load configuration from a YAML file, without environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse config: {}", e)))
    }

    /// The operation table with configured overrides applied.
    pub fn operation_table(&self) -> OperationTable {
        OperationTable::builtin().with_overrides(
            self.weights
                .iter()
                .map(|(name, op)| (name.clone(), *op)),
        )
    }

    /// Policies from the configured descriptors, if any were given.
    pub fn policies(&self) -> Option<LimitPolicies> {
        self.limits
            .as_deref()
            .map(LimitPolicies::from_descriptors)
    }
}
