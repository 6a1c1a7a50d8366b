//! dropout-dash library - student dropout dashboard service
//!
//! Serves descriptive analytics over the student dataset and single-student
//! dropout predictions with per-feature explanations.

use axum::Router;
use chrono::{DateTime, Utc};
use dropout_common::pipeline::PipelineSettings;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod pagination;
pub mod resources;

use resources::{DatasetCache, ModelHandle};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Model loaded once at start-up
    pub model: Arc<ModelHandle>,
    /// Dataset cache, swapped only by the reload endpoint
    pub dataset: Arc<DatasetCache>,
    pub settings: Arc<PipelineSettings>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(model: ModelHandle, dataset: DatasetCache, settings: PipelineSettings) -> Self {
        Self {
            model: Arc::new(model),
            dataset: Arc::new(dataset),
            settings: Arc::new(settings),
            started_at: dropout_common::time::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let dashboard = Router::new()
        .route("/api/dashboard/filters", get(api::get_filters))
        .route("/api/dashboard/summary", get(api::get_summary))
        .route("/api/dashboard/distribution/:column", get(api::get_distribution))
        .route("/api/dashboard/categorical/:column", get(api::get_categorical))
        .route("/api/dashboard/correlation", get(api::get_correlation))
        .route("/api/dashboard/table", get(api::get_table_page))
        .route("/api/dataset/reload", post(api::reload_dataset));

    let prediction = Router::new().route("/api/predict", post(api::predict));

    Router::new()
        .merge(dashboard)
        .merge(prediction)
        .route("/api/status", get(api::get_status))
        .merge(api::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
