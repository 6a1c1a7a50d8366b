//! Bootstrap configuration
//!
//! Every setting resolves in this order (highest first):
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default
//!
//! The binary's `clap` arguments fold 1 and 2 together through the
//! `*_ENV_VAR` names below; [`TomlConfig::resolve`] lays the result over
//! 3 and 4. A missing TOML file is not an error; the compiled defaults apply.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::inference::ClassMapping;
use crate::{Error, Result};

/// Directory name under the platform config dir
pub const APP_DIR_NAME: &str = "dropout-dash";

pub const CONFIG_ENV_VAR: &str = "DROPOUT_DASH_CONFIG";
pub const PORT_ENV_VAR: &str = "DROPOUT_DASH_PORT";
pub const BIND_ENV_VAR: &str = "DROPOUT_DASH_BIND";
pub const DATA_PATH_ENV_VAR: &str = "DROPOUT_DASH_DATA";
pub const MODEL_DIR_ENV_VAR: &str = "DROPOUT_DASH_MODEL_DIR";

/// Bootstrap configuration loaded from TOML
///
/// Read once at start-up; changes need a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Semicolon-delimited dataset file
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Directory holding the model artifact
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Artifact file name without extension
    #[serde(default = "default_model_stem")]
    pub model_stem: String,

    /// Features listed per explanation
    #[serde(default = "default_top_features")]
    pub top_features: usize,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub classes: ClassesConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error); `RUST_LOG` wins
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Class code labels and the alert class
///
/// TOML table keys are strings, so codes are parsed in [`ClassesConfig::to_mapping`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassesConfig {
    #[serde(default = "default_labels")]
    pub labels: BTreeMap<String, String>,
    #[serde(default = "default_target")]
    pub target: usize,
}

fn default_port() -> u16 {
    5730
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data/data.csv")
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("model")
}

fn default_model_stem() -> String {
    "tuned_lightgbm_model".to_string()
}

fn default_top_features() -> usize {
    crate::attribution::DEFAULT_TOP_FEATURES
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_labels() -> BTreeMap<String, String> {
    ClassMapping::default()
        .labels
        .into_iter()
        .map(|(code, label)| (code.to_string(), label))
        .collect()
}

fn default_target() -> usize {
    ClassMapping::default().target
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            data_path: default_data_path(),
            model_dir: default_model_dir(),
            model_stem: default_model_stem(),
            top_features: default_top_features(),
            logging: LoggingConfig::default(),
            classes: ClassesConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ClassesConfig {
    fn default() -> Self {
        Self {
            labels: default_labels(),
            target: default_target(),
        }
    }
}

impl ClassesConfig {
    pub fn to_mapping(&self) -> Result<ClassMapping> {
        let mut labels = BTreeMap::new();
        for (code, label) in &self.labels {
            let code: usize = code.trim().parse().map_err(|_| {
                Error::Config(format!("Class code '{}' is not a non-negative integer", code))
            })?;
            labels.insert(code, label.clone());
        }
        Ok(ClassMapping {
            labels,
            target: self.target,
        })
    }
}

/// `<config_dir>/dropout-dash/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.toml"))
}

/// Config file path: the given one, else the platform default
pub fn resolve_config_path(given: Option<&Path>) -> Option<PathBuf> {
    match given {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path(),
    }
}

/// Load the TOML file, or defaults when it does not exist
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Argument or environment values that override the TOML file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub bind_address: Option<String>,
    pub data_path: Option<PathBuf>,
    pub model_dir: Option<PathBuf>,
}

impl TomlConfig {
    /// Apply overrides on top of the file values
    pub fn resolve(self, overrides: Overrides) -> Self {
        Self {
            port: overrides.port.unwrap_or(self.port),
            bind_address: overrides.bind_address.unwrap_or(self.bind_address),
            data_path: overrides.data_path.unwrap_or(self.data_path),
            model_dir: overrides.model_dir.unwrap_or(self.model_dir),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.port, 5730);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.data_path, PathBuf::from("data/data.csv"));
        assert_eq!(config.model_stem, "tuned_lightgbm_model");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.top_features, 15);
        assert_eq!(config.classes.to_mapping().unwrap(), ClassMapping::default());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
port = 6000

[logging]
level = "debug"
"#,
        )
        .unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.model_dir, PathBuf::from("model"));
        assert_eq!(config.classes, ClassesConfig::default());
    }

    #[test]
    fn test_class_labels_from_toml() {
        let config: TomlConfig = toml::from_str(
            r#"
[classes]
target = 0

[classes.labels]
0 = "Dropout"
1 = "Enrolled"
2 = "Graduate"
"#,
        )
        .unwrap();
        let mapping = config.classes.to_mapping().unwrap();
        assert_eq!(mapping.target, 0);
        assert_eq!(mapping.label(2), "Graduate");
    }

    #[test]
    fn test_bad_class_code_is_config_error() {
        let mut classes = ClassesConfig::default();
        classes.labels.insert("one".to_string(), "x".to_string());
        assert!(matches!(classes.to_mapping(), Err(Error::Config(_))));
    }
}
