//! Dataset cache control

use axum::{extract::State, response::Json};

use crate::resources::DatasetStatusView;
use crate::AppState;

/// POST /api/dataset/reload
///
/// Always 200; the body reports whether the new read succeeded.
pub async fn reload_dataset(State(state): State<AppState>) -> Json<DatasetStatusView> {
    Json(state.dataset.reload().await)
}
