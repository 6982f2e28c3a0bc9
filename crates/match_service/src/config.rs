//! Service configuration
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! environment overrides.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::errors::{Result, ServiceError};

/// Which medians fill missing cells at prediction time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImputationSource {
    /// Medians of the data being scored
    #[default]
    Current,
    /// Medians captured when the model was trained
    Training,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub model_path: PathBuf,
    pub model_config_path: PathBuf,
    /// Sled database for match history; in-memory when absent
    pub history_db_path: Option<PathBuf>,
    pub debounce_ms: u64,
    pub status_ttl_secs: u64,
    /// Final score at or above which a match is recorded
    pub history_threshold: f64,
    pub imputation: ImputationSource,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/random_forest.json"),
            model_config_path: PathBuf::from("models/model_config.json"),
            history_db_path: None,
            debounce_ms: 3000,
            status_ttl_secs: 30,
            history_threshold: 50.0,
            imputation: ImputationSource::Current,
        }
    }
}

/// Partial TOML file; absent keys keep their defaults
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    model_path: Option<PathBuf>,
    model_config_path: Option<PathBuf>,
    history_db_path: Option<PathBuf>,
    debounce_ms: Option<u64>,
    status_ttl_secs: Option<u64>,
    history_threshold: Option<f64>,
    imputation: Option<ImputationSource>,
}

impl ServiceConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            config.merge_file(path)?;
        }
        config.apply_env_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlay the keys present in a TOML file.
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path).map_err(|e| {
            ServiceError::ConfigError(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        self.merge_toml(&content)
    }

    pub fn merge_toml(&mut self, content: &str) -> Result<()> {
        let file: ConfigFile = toml::from_str(content)?;
        if let Some(v) = file.model_path {
            self.model_path = v;
        }
        if let Some(v) = file.model_config_path {
            self.model_config_path = v;
        }
        if file.history_db_path.is_some() {
            self.history_db_path = file.history_db_path;
        }
        if let Some(v) = file.debounce_ms {
            self.debounce_ms = v;
        }
        if let Some(v) = file.status_ttl_secs {
            self.status_ttl_secs = v;
        }
        if let Some(v) = file.history_threshold {
            self.history_threshold = v;
        }
        if let Some(v) = file.imputation {
            self.imputation = v;
        }
        Ok(())
    }

    /// Apply `MODEL_PATH`, `MODEL_CONFIG_PATH`, `ORGANMATCH_HISTORY_DB` and
    /// `ORGANMATCH_DEBOUNCE_MS` from `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MODEL_PATH") {
            self.model_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("MODEL_CONFIG_PATH") {
            self.model_config_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ORGANMATCH_HISTORY_DB") {
            self.history_db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("ORGANMATCH_DEBOUNCE_MS") {
            match v.parse() {
                Ok(ms) => self.debounce_ms = ms,
                Err(_) => warn!("Ignoring ORGANMATCH_DEBOUNCE_MS={v}: not an integer"),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.history_threshold) {
            return Err(ServiceError::ConfigError(format!(
                "history_threshold must be within 0..=100, got {}",
                self.history_threshold
            )));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_secs)
    }
}
