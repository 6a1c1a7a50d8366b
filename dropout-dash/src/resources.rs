//! Process-wide model handle and dataset cache
//!
//! Both are built once in `main` and shared through [`crate::AppState`].
//! Neither constructor fails: a missing or broken resource becomes a
//! visible status, and the endpoints that need it answer 503.

use chrono::{DateTime, Utc};
use dropout_common::dataset::{load_dataset, DataTable};
use dropout_common::inference::ClassMapping;
use dropout_common::model::{load_model, Classifier, ModelError, TreeEnsemble};
use dropout_common::time;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::error::{ApiError, ApiResult};

/// Availability of a shared resource
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResourceStatus {
    Ready,
    /// Nothing to load at the configured location
    Missing { message: String },
    /// Present but unusable (parse, validation or configuration failure)
    Failed { message: String },
}

impl ResourceStatus {
    fn message(&self) -> Option<&str> {
        match self {
            ResourceStatus::Ready => None,
            ResourceStatus::Missing { message } | ResourceStatus::Failed { message } => {
                Some(message)
            }
        }
    }
}

/// Loaded model plus how it got there
pub struct ModelHandle {
    model: Option<Arc<TreeEnsemble>>,
    status: ResourceStatus,
    path: Option<PathBuf>,
    loaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ModelStatusView {
    #[serde(flatten)]
    pub status: ResourceStatus,
    pub path: Option<PathBuf>,
    pub loaded_at: String,
    pub n_classes: Option<usize>,
    pub n_features: Option<usize>,
}

impl ModelHandle {
    /// Load `<dir>/<stem>.{json,toml}` and check `classes` against it
    pub fn load(dir: &Path, stem: &str, classes: &ClassMapping) -> Self {
        match load_model(dir, stem) {
            Ok(loaded) => {
                let mut handle = Self::from_model(loaded.ensemble, classes);
                handle.path = Some(loaded.path);
                handle
            }
            Err(e @ ModelError::NotFound { .. }) => {
                warn!("{}; prediction disabled", e);
                Self::unavailable(ResourceStatus::Missing {
                    message: e.to_string(),
                })
            }
            Err(e) => {
                error!("Model could not be loaded: {}", e);
                Self::unavailable(ResourceStatus::Failed {
                    message: e.to_string(),
                })
            }
        }
    }

    /// Wrap an in-memory model
    pub fn from_model(model: TreeEnsemble, classes: &ClassMapping) -> Self {
        let status = match classes.check(model.n_classes()) {
            Ok(()) => ResourceStatus::Ready,
            Err(reason) => {
                error!("Class mapping does not fit the model: {}", reason);
                ResourceStatus::Failed {
                    message: format!("Class mapping does not fit the model: {}", reason),
                }
            }
        };
        Self {
            model: Some(Arc::new(model)),
            status,
            path: None,
            loaded_at: Some(time::now()),
        }
    }

    pub fn unavailable(status: ResourceStatus) -> Self {
        Self {
            model: None,
            status,
            path: None,
            loaded_at: None,
        }
    }

    /// The model, when it is ready for prediction
    pub fn ready(&self) -> ApiResult<Arc<TreeEnsemble>> {
        match (&self.status, &self.model) {
            (ResourceStatus::Ready, Some(model)) => Ok(Arc::clone(model)),
            (status, _) => Err(ApiError::Unavailable(
                status
                    .message()
                    .unwrap_or("Model not loaded")
                    .to_string(),
            )),
        }
    }

    pub fn status_view(&self) -> ModelStatusView {
        ModelStatusView {
            status: self.status.clone(),
            path: self.path.clone(),
            loaded_at: time::format_optional(self.loaded_at),
            n_classes: self.model.as_ref().map(|m| m.n_classes),
            n_features: self.model.as_ref().map(|m| m.n_features),
        }
    }
}

struct DatasetSlot {
    table: Option<Arc<DataTable>>,
    status: ResourceStatus,
    warnings: Vec<String>,
    loaded_at: Option<DateTime<Utc>>,
}

impl DatasetSlot {
    fn from_load(path: &Path) -> Self {
        match load_dataset(path) {
            Ok(loaded) => Self {
                table: Some(Arc::new(loaded.table)),
                status: ResourceStatus::Ready,
                warnings: loaded.warnings,
                loaded_at: Some(time::now()),
            },
            Err(e) => {
                let message = e.to_string();
                warn!("Dataset unavailable: {}", message);
                let status = if path.exists() {
                    ResourceStatus::Failed { message }
                } else {
                    ResourceStatus::Missing { message }
                };
                Self {
                    table: None,
                    status,
                    warnings: Vec::new(),
                    loaded_at: None,
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DatasetStatusView {
    #[serde(flatten)]
    pub status: ResourceStatus,
    pub path: PathBuf,
    pub loaded_at: String,
    pub rows: Option<usize>,
    pub columns: Option<usize>,
    pub warnings: Vec<String>,
}

/// The dashboard dataset, read once per path and kept until reloaded
pub struct DatasetCache {
    path: PathBuf,
    slot: RwLock<DatasetSlot>,
}

impl DatasetCache {
    /// Read the dataset at `path`
    pub async fn load(path: PathBuf) -> Self {
        let slot = read_slot(path.clone()).await;
        Self {
            path,
            slot: RwLock::new(slot),
        }
    }

    /// Wrap an in-memory table; reloads read `path`
    pub fn from_table(path: PathBuf, table: DataTable) -> Self {
        Self {
            path,
            slot: RwLock::new(DatasetSlot {
                table: Some(Arc::new(table)),
                status: ResourceStatus::Ready,
                warnings: Vec::new(),
                loaded_at: Some(time::now()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current table, or 503 naming why there is none
    pub async fn table(&self) -> ApiResult<Arc<DataTable>> {
        let slot = self.slot.read().await;
        match &slot.table {
            Some(table) => Ok(Arc::clone(table)),
            None => Err(ApiError::Unavailable(
                slot.status
                    .message()
                    .unwrap_or("Dataset not loaded")
                    .to_string(),
            )),
        }
    }

    /// Drop the cached table and read the file again
    ///
    /// A failed reload leaves the cache empty, matching the file on disk.
    pub async fn reload(&self) -> DatasetStatusView {
        info!("Reloading dataset from {}", self.path.display());
        let fresh = read_slot(self.path.clone()).await;
        *self.slot.write().await = fresh;
        self.status_view().await
    }

    pub async fn status_view(&self) -> DatasetStatusView {
        let slot = self.slot.read().await;
        DatasetStatusView {
            status: slot.status.clone(),
            path: self.path.clone(),
            loaded_at: time::format_optional(slot.loaded_at),
            rows: slot.table.as_ref().map(|t| t.len()),
            columns: slot.table.as_ref().map(|t| t.columns().len()),
            warnings: slot.warnings.clone(),
        }
    }
}

/// Parse the file off the async runtime
async fn read_slot(path: PathBuf) -> DatasetSlot {
    let shown = path.display().to_string();
    match tokio::task::spawn_blocking(move || DatasetSlot::from_load(&path)).await {
        Ok(slot) => slot,
        Err(e) => {
            error!("Dataset load task for {} failed: {}", shown, e);
            DatasetSlot {
                table: None,
                status: ResourceStatus::Failed {
                    message: format!("Dataset load task failed: {}", e),
                },
                warnings: Vec::new(),
                loaded_at: None,
            }
        }
    }
}
