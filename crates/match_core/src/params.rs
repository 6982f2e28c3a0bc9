//! Forest hyperparameters and their persisted configuration file

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::errors::{CoreError, Result};
use crate::store::write_atomic;

/// Range-bounded random-forest hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyperParams {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum tree depth; `None` grows trees until leaves are pure
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Minimum samples required in each leaf
    pub min_samples_leaf: usize,
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: Some(10),
            min_samples_split: 5,
            min_samples_leaf: 2,
        }
    }
}

impl HyperParams {
    pub const N_ESTIMATORS_RANGE: (usize, usize) = (10, 500);
    pub const MAX_DEPTH_RANGE: (usize, usize) = (3, 50);
    pub const MIN_SAMPLES_SPLIT_RANGE: (usize, usize) = (2, 20);
    pub const MIN_SAMPLES_LEAF_RANGE: (usize, usize) = (1, 20);

    pub fn validate(&self) -> Result<()> {
        check_range("n_estimators", self.n_estimators, Self::N_ESTIMATORS_RANGE)?;
        if let Some(depth) = self.max_depth {
            check_range("max_depth", depth, Self::MAX_DEPTH_RANGE)?;
        }
        check_range(
            "min_samples_split",
            self.min_samples_split,
            Self::MIN_SAMPLES_SPLIT_RANGE,
        )?;
        check_range(
            "min_samples_leaf",
            self.min_samples_leaf,
            Self::MIN_SAMPLES_LEAF_RANGE,
        )?;
        Ok(())
    }

    /// Load the persisted configuration, overlaying known keys on the defaults.
    ///
    /// A missing or unreadable file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }

        match Self::load(path) {
            Ok(params) => params,
            Err(e) => {
                warn!("Ignoring model config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    fn load(path: &Path) -> Result<Self> {
        let stored: Map<String, Value> = serde_json::from_str(&fs::read_to_string(path)?)?;
        let mut merged = match serde_json::to_value(Self::default())? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for key in Self::keys() {
            if let Some(value) = stored.get(key) {
                merged.insert(key.to_string(), value.clone());
            }
        }
        Ok(serde_json::from_value(Value::Object(merged))?)
    }

    /// Persist these parameters, keeping unrelated keys already in the file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut merged: Map<String, Value> = fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();

        if let Value::Object(current) = serde_json::to_value(self)? {
            merged.extend(current);
        }

        let json = serde_json::to_string_pretty(&Value::Object(merged))?;
        write_atomic(path, json.as_bytes())
    }

    fn keys() -> [&'static str; 4] {
        [
            "n_estimators",
            "max_depth",
            "min_samples_split",
            "min_samples_leaf",
        ]
    }
}

fn check_range(name: &str, value: usize, (min, max): (usize, usize)) -> Result<()> {
    if value < min || value > max {
        return Err(CoreError::InvalidParameters(format!(
            "{name} must be between {min} and {max}, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let params = HyperParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.n_estimators, 100);
        assert_eq!(params.max_depth, Some(10));
    }

    #[test]
    fn test_range_validation() {
        let mut params = HyperParams::default();
        params.n_estimators = 5;
        assert!(params.validate().is_err());

        let mut params = HyperParams::default();
        params.max_depth = None;
        assert!(params.validate().is_ok());
        params.max_depth = Some(2);
        assert!(params.validate().is_err());

        let mut params = HyperParams::default();
        params.min_samples_leaf = 21;
        assert!(matches!(params.validate(), Err(CoreError::InvalidParameters(_))));
    }

    #[test]
    fn test_partial_file_overlays_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model_config.json");
        fs::write(&path, r#"{"n_estimators": 42, "unrelated": true}"#).unwrap();

        let params = HyperParams::load_or_default(&path);
        assert_eq!(params.n_estimators, 42);
        assert_eq!(params.min_samples_split, 5);
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model_config.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(HyperParams::load_or_default(&path), HyperParams::default());
    }

    #[test]
    fn test_save_keeps_foreign_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("model_config.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"note": "keep me"}"#).unwrap();

        let params = HyperParams {
            n_estimators: 20,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        };
        params.save(&path).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["note"], "keep me");
        assert!(raw["max_depth"].is_null());
        assert_eq!(HyperParams::load_or_default(&path), params);
    }
}
