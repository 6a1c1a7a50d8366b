//! Single-student prediction endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use dropout_common::features::StudentRecord;
use dropout_common::pipeline::{run_prediction, PredictionReport};
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// POST /api/predict
///
/// Body: a student record; omitted fields take the form defaults, unknown
/// fields are rejected. An attribution failure still answers 200 with the
/// prediction and the attribution error inside.
pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<StudentRecord>, JsonRejection>,
) -> ApiResult<Json<PredictionReport>> {
    let Json(record) = payload.map_err(|rejection| {
        warn!("Rejected prediction request: {}", rejection.body_text());
        ApiError::BadRequest(rejection.body_text())
    })?;

    let model = state.model.ready()?;
    let report = run_prediction(&record, model.as_ref(), model.as_ref(), &state.settings)?;
    Ok(Json(report))
}
