//! Model bundle persistence
//!
//! The current model lives at a single path and is replaced wholesale on each
//! training run. Writes go to a temporary file in the same directory and are
//! renamed into place, so a concurrent reader sees either the previous bundle
//! or the new one, never a partial write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::errors::{CoreError, Result};
use crate::forest::Forest;
use crate::params::HyperParams;
use crate::serde_canon::hash_canonical_hex;

/// Everything the predictor needs to reproduce a training run's inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub forest: Forest,
    /// Feature columns in model input order (pair ids excluded)
    pub feature_columns: Vec<String>,
    /// Hyperparameters the forest was actually trained with
    pub params: HyperParams,
    /// Per-column medians of the training matrix
    pub training_medians: Vec<f64>,
    pub created_at: DateTime<Utc>,
}

impl ModelBundle {
    pub fn hash_hex(&self) -> Result<String> {
        Ok(hash_canonical_hex(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.forest.validate()?;
        if self.feature_columns.len() != self.forest.n_features {
            return Err(CoreError::ValidationFailed(format!(
                "bundle lists {} columns for a {}-feature forest",
                self.feature_columns.len(),
                self.forest.n_features
            )));
        }
        if self.training_medians.len() != self.forest.n_features {
            return Err(CoreError::ValidationFailed(format!(
                "bundle lists {} medians for a {}-feature forest",
                self.training_medians.len(),
                self.forest.n_features
            )));
        }
        Ok(())
    }

    /// Feature importances keyed by column, highest first.
    pub fn ranked_importances(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .feature_columns
            .iter()
            .cloned()
            .zip(self.forest.feature_importances.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

/// On-disk envelope binding a bundle to its content hash
#[derive(Debug, Serialize, Deserialize)]
struct StoredBundle {
    hash: String,
    bundle: ModelBundle,
}

/// Named locations of the current model and its hyperparameter config
#[derive(Debug, Clone)]
pub struct ModelStore {
    model_path: PathBuf,
    config_path: PathBuf,
}

impl ModelStore {
    pub fn new(model_path: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            config_path: config_path.into(),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn has_model(&self) -> bool {
        self.model_path.exists()
    }

    /// Atomically replace the current bundle. Returns its hash.
    pub fn save(&self, bundle: &ModelBundle) -> Result<String> {
        bundle.validate()?;
        let hash = bundle.hash_hex()?;
        let stored = StoredBundle {
            hash: hash.clone(),
            bundle: bundle.clone(),
        };
        write_atomic(&self.model_path, &serde_json::to_vec(&stored)?)?;
        info!("Model saved to {} ({})", self.model_path.display(), hash);
        Ok(hash)
    }

    /// Load the current bundle; `Ok(None)` when no model has been trained.
    pub fn load(&self) -> Result<Option<ModelBundle>> {
        let raw = match fs::read(&self.model_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Model not found at {}", self.model_path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let stored: StoredBundle = serde_json::from_slice(&raw)?;
        let actual = stored.bundle.hash_hex()?;
        if actual != stored.hash {
            return Err(CoreError::IntegrityMismatch {
                expected: stored.hash,
                actual,
            });
        }
        stored.bundle.validate()?;
        Ok(Some(stored.bundle))
    }

    /// Persisted hyperparameters, or the defaults.
    pub fn load_params(&self) -> HyperParams {
        HyperParams::load_or_default(&self.config_path)
    }

    pub fn save_params(&self, params: &HyperParams) -> Result<()> {
        params.save(&self.config_path)
    }
}

/// Write `bytes` to `path` through a same-directory temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| CoreError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::{Node, Tree};
    use tempfile::tempdir;

    fn bundle() -> ModelBundle {
        let tree = Tree::new(vec![
            Node::internal(0, 1, 0.5, 1, 2),
            Node::leaf(1, 0.2),
            Node::leaf(2, 0.9),
        ]);
        ModelBundle {
            forest: Forest::new(2, vec![tree], vec![0.25, 0.75]),
            feature_columns: vec!["hla_match_score".into(), "blood_factor".into()],
            params: HyperParams::default(),
            training_medians: vec![0.5, 1.0],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_missing_model_is_none() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("model.json"), dir.path().join("cfg.json"));
        assert!(!store.has_model());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(
            dir.path().join("models").join("model.json"),
            dir.path().join("models").join("cfg.json"),
        );
        let original = bundle();
        let hash = store.save(&original).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, original);
        assert_eq!(loaded.hash_hex().unwrap(), hash);
        assert_eq!(loaded.ranked_importances()[0].0, "blood_factor");
    }

    #[test]
    fn test_tampered_bundle_rejected() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("model.json"), dir.path().join("cfg.json"));
        store.save(&bundle()).unwrap();

        let raw = fs::read_to_string(store.model_path()).unwrap();
        fs::write(store.model_path(), raw.replace("0.9", "0.8")).unwrap();

        assert!(matches!(store.load(), Err(CoreError::IntegrityMismatch { .. })));
    }

    #[test]
    fn test_save_replaces_previous_bundle() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("model.json"), dir.path().join("cfg.json"));
        store.save(&bundle()).unwrap();

        let mut second = bundle();
        second.training_medians = vec![0.1, 0.2];
        store.save(&second).unwrap();

        assert_eq!(store.load().unwrap().unwrap().training_medians, vec![0.1, 0.2]);
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_irrational_floats_survive_reload() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("model.json"), dir.path().join("cfg.json"));

        let mut original = bundle();
        original.training_medians = vec![1234.567_890_123_4, 0.1 + 0.2];
        original.forest.feature_importances = vec![1.0 / 3.0, 2.0 / 3.0];
        original.forest.trees[0].nodes[0].threshold = 348.876_543_219_876_5;
        original.forest.trees[0].nodes[1].leaf = Some(2.0 / 7.0);

        let hash = store.save(&original).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, original);
        assert_eq!(loaded.hash_hex().unwrap(), hash);
    }

    mod roundtrip {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn saved_bundle_loads_bit_exact(
                medians in prop::array::uniform2(-5000.0f64..5000.0),
                importance in 0.0f64..=1.0,
                threshold in prop::num::f64::NORMAL,
                leaves in prop::array::uniform2(0.0f64..=1.0),
            ) {
                let dir = tempdir().unwrap();
                let store =
                    ModelStore::new(dir.path().join("model.json"), dir.path().join("cfg.json"));

                let mut original = bundle();
                original.training_medians = medians.to_vec();
                original.forest.feature_importances = vec![importance, 1.0 - importance];
                original.forest.trees[0].nodes[0].threshold = threshold;
                original.forest.trees[0].nodes[1].leaf = Some(leaves[0]);
                original.forest.trees[0].nodes[2].leaf = Some(leaves[1]);

                let hash = store.save(&original).unwrap();
                let loaded = store.load().unwrap().unwrap();
                prop_assert_eq!(loaded.hash_hex().unwrap(), hash);
                for (a, b) in loaded.training_medians.iter().zip(&original.training_medians) {
                    prop_assert_eq!(a.to_bits(), b.to_bits());
                }
                prop_assert_eq!(loaded, original);
            }
        }
    }
}
