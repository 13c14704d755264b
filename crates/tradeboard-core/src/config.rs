//! Configuration schema (tradeboard.toml)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use crate::contract::ContractDefinition;
use crate::issue::{IssueCode, Severity};
use crate::pipeline_spec::PipelineSpec;

fn default_max_entries() -> usize {
    10
}

fn default_max_total_size_bytes() -> usize {
    256 * 1024 * 1024
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_compute_timeout_secs() -> Option<u64> {
    Some(30)
}

/// Cache bounds and timeouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Maximum number of stored datasets
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Maximum sum of estimated dataset sizes, in bytes
    #[serde(default = "default_max_total_size_bytes")]
    pub max_total_size_bytes: usize,

    /// Entries older than this are recomputed on next lookup
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// How long a caller waits for a computation (unset = wait forever)
    #[serde(default = "default_compute_timeout_secs")]
    pub compute_timeout_secs: Option<u64>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_total_size_bytes: default_max_total_size_bytes(),
            ttl_secs: default_ttl_secs(),
            compute_timeout_secs: default_compute_timeout_secs(),
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn compute_timeout(&self) -> Option<Duration> {
        self.compute_timeout_secs.map(Duration::from_secs)
    }
}

/// Severity threshold overrides for specific issue codes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityThreshold {
    /// Map of issue code to severity override
    #[serde(default)]
    pub overrides: HashMap<String, Severity>,
}

impl SeverityThreshold {
    /// Get severity for an issue code, or default
    pub fn get_severity(&self, code: IssueCode, default: Severity) -> Severity {
        self.overrides
            .get(code.as_str())
            .copied()
            .unwrap_or(default)
    }

    /// Set severity override for a code
    pub fn set_override(&mut self, code: IssueCode, severity: Severity) {
        self.overrides.insert(code.as_str().to_string(), severity);
    }
}

/// Main configuration structure
///
/// Contracts and pipelines listed here are added to (and override by name)
/// the built-in market, competitor and supplier definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Cache bounds
    #[serde(default)]
    pub cache: CacheSettings,

    /// Severity thresholds
    #[serde(default)]
    pub severity: SeverityThreshold,

    /// Schema contracts by dataset kind
    #[serde(default)]
    pub contracts: BTreeMap<String, ContractDefinition>,

    /// Transform pipelines by dataset kind
    #[serde(default)]
    pub pipelines: BTreeMap<String, PipelineSpec>,

    /// Directory the config was loaded from (for resolving relative paths)
    #[serde(skip)]
    pub project_root: std::path::PathBuf,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.check_bounds()?;
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("cache.max_entries must be at least 1".into()));
        }
        if self.cache.max_total_size_bytes == 0 {
            return Err(ConfigError::Invalid("cache.max_total_size_bytes must be at least 1".into()));
        }
        Ok(())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
