//! Classifier and explainer seams plus model artifact loading
//!
//! The dashboard talks to its model only through [`Classifier`] and
//! [`Explainer`]. The shipped implementation is a gradient-boosted
//! [`TreeEnsemble`] read from a JSON or TOML artifact.

pub mod ensemble;

pub use ensemble::{ExplainerOutput, Node, Tree, TreeEnsemble};

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::attribution::{ExpectedValue, RawAttribution};

/// Artifact extensions, in lookup preference order
pub const MODEL_EXTENSIONS: [&str; 2] = ["json", "toml"];

/// Model errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// No artifact with any supported extension exists
    #[error("No model artifact named '{stem}' (.json or .toml) in {}", .dir.display())]
    NotFound { dir: PathBuf, stem: String },

    #[error("Failed to read model artifact {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse model artifact {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// Artifact parsed but is structurally inconsistent
    #[error("Invalid model: {0}")]
    Invalid(String),

    /// Model rejected an input at prediction time
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// A fitted classifier over one aligned row
pub trait Classifier: Send + Sync {
    /// Predicted class code
    fn predict(&self, row: &[f64]) -> Result<usize, ModelError>;

    /// Probability per class code
    fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>, ModelError>;

    /// Ordered feature names the model was fitted with, if it records them
    fn expected_features(&self) -> Option<&[String]>;

    fn n_classes(&self) -> usize;
}

/// Per-feature attribution for a single row
pub trait Explainer: Send + Sync {
    fn expected_value(&self) -> ExpectedValue;

    /// Contributions in whatever layout the explainer produces
    fn explain(&self, row: &[f64]) -> Result<RawAttribution, ModelError>;
}

/// A model artifact read from disk
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub ensemble: TreeEnsemble,
    pub path: PathBuf,
}

/// First existing `<dir>/<stem>.<ext>` in [`MODEL_EXTENSIONS`] order
pub fn locate_model(dir: &Path, stem: &str) -> Option<PathBuf> {
    MODEL_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .find(|path| path.is_file())
}

/// Load and validate the model artifact
///
/// Only the first existing file is tried; a broken `.json` does not fall
/// back to a `.toml` beside it.
pub fn load_model(dir: &Path, stem: &str) -> Result<LoadedModel, ModelError> {
    let path = locate_model(dir, stem).ok_or_else(|| ModelError::NotFound {
        dir: dir.to_path_buf(),
        stem: stem.to_string(),
    })?;
    debug!("Loading model artifact from {}", path.display());

    let text = std::fs::read_to_string(&path).map_err(|source| ModelError::Read {
        path: path.clone(),
        source,
    })?;

    let parsed = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => TreeEnsemble::from_toml_str(&text),
        _ => TreeEnsemble::from_json_str(&text),
    };
    let ensemble = parsed.map_err(|message| ModelError::Parse {
        path: path.clone(),
        message,
    })?;
    ensemble.validate()?;

    info!(
        "Loaded model {} ({} trees, {} classes, {} features)",
        path.display(),
        ensemble.trees.len(),
        ensemble.n_classes,
        ensemble.n_features
    );
    Ok(LoadedModel { ensemble, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const JSON_MODEL: &str = r#"{
        "n_features": 1,
        "n_classes": 2,
        "base_score": [0.0],
        "trees": [{"output": 0, "nodes": [{"kind": "leaf", "value": 0.5}]}]
    }"#;

    const TOML_MODEL: &str = r#"
n_features = 1
n_classes = 2
base_score = [1.0]

[[trees]]
output = 0

[[trees.nodes]]
kind = "leaf"
value = -0.5
"#;

    #[test]
    fn test_missing_artifact_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = load_model(dir.path(), "model").unwrap_err();
        assert!(matches!(err, ModelError::NotFound { .. }));
        assert!(err.to_string().contains("'model'"));
    }

    #[test]
    fn test_json_preferred_over_toml() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("model.toml"), TOML_MODEL).unwrap();
        fs::write(dir.path().join("model.json"), JSON_MODEL).unwrap();

        let loaded = load_model(dir.path(), "model").unwrap();
        assert_eq!(loaded.path, dir.path().join("model.json"));
        assert_eq!(loaded.ensemble.base_score, vec![0.0]);
    }

    #[test]
    fn test_toml_used_when_json_absent() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("model.toml"), TOML_MODEL).unwrap();

        let loaded = load_model(dir.path(), "model").unwrap();
        assert_eq!(loaded.path, dir.path().join("model.toml"));
        assert_eq!(loaded.ensemble.base_score, vec![1.0]);
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("model.json"), "{ not json").unwrap();
        fs::write(dir.path().join("model.toml"), TOML_MODEL).unwrap();

        let err = load_model(dir.path(), "model").unwrap_err();
        assert!(matches!(err, ModelError::Parse { .. }));
        assert!(err.to_string().contains("model.json"));
    }
}
