//! Service status endpoint
//!
//! Build identification plus the state of the model and the dataset.

use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::resources::{DatasetStatusView, ModelStatusView};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct BuildInfo {
    pub version: String,
    pub git_hash: String,
    pub build_timestamp: String,
    pub build_profile: String,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_hash: env!("GIT_HASH").to_string(),
            build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
            build_profile: env!("BUILD_PROFILE").to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub build: BuildInfo,
    pub started_at: String,
    pub model: ModelStatusView,
    pub dataset: DatasetStatusView,
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        build: BuildInfo::current(),
        started_at: state.started_at.to_rfc3339(),
        model: state.model.status_view(),
        dataset: state.dataset.status_view().await,
    })
}
