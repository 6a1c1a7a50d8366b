//! Dashboard analytics endpoints
//!
//! Every view accepts the categorical filters as query parameters
//! (`?Course_name=Nursing&Campus=All`); `All` means "no filter". An empty
//! filtered table is a normal answer (`empty: true`), not an error.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use dropout_common::dataset::analytics::{
    apply_filters, categorical_breakdown, categorical_breakdown_columns,
    categorical_filter_columns, compute_kpis, correlation_matrix, numeric_distribution,
    numeric_distribution_columns, status_distribution, BreakdownRow, CorrelationMatrix,
    FilterColumn, GroupSummary, Kpis, StatusCount,
};
use dropout_common::dataset::{Cell, DataTable};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, PAGE_SIZE};
use crate::AppState;

/// Raw query parameters; everything except reserved keys is a filter
type Selections = BTreeMap<String, String>;

async fn filtered(state: &AppState, selections: &Selections) -> ApiResult<DataTable> {
    let table = state.dataset.table().await?;
    let filtered = apply_filters(&table, selections)?;
    debug!(
        "Filters {:?} kept {} of {} rows",
        selections,
        filtered.len(),
        table.len()
    );
    Ok(filtered)
}

#[derive(Debug, Serialize)]
pub struct FiltersResponse {
    pub filters: Vec<FilterColumn>,
    /// Columns accepted by the distribution view
    pub distribution_columns: Vec<String>,
    /// Columns accepted by the categorical view
    pub categorical_columns: Vec<String>,
}

/// GET /api/dashboard/filters
pub async fn get_filters(State(state): State<AppState>) -> ApiResult<Json<FiltersResponse>> {
    let table = state.dataset.table().await?;
    Ok(Json(FiltersResponse {
        filters: categorical_filter_columns(&table),
        distribution_columns: numeric_distribution_columns(&table),
        categorical_columns: categorical_breakdown_columns(&table),
    }))
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub empty: bool,
    pub filters: Selections,
    pub kpis: Kpis,
    pub status_distribution: Vec<StatusCount>,
}

/// GET /api/dashboard/summary
pub async fn get_summary(
    State(state): State<AppState>,
    Query(selections): Query<Selections>,
) -> ApiResult<Json<SummaryResponse>> {
    let table = filtered(&state, &selections).await?;
    Ok(Json(SummaryResponse {
        empty: table.is_empty(),
        kpis: compute_kpis(&table)?,
        status_distribution: status_distribution(&table)?,
        filters: selections,
    }))
}

#[derive(Debug, Serialize)]
pub struct DistributionResponse {
    pub column: String,
    pub empty: bool,
    pub groups: Vec<GroupSummary>,
}

/// GET /api/dashboard/distribution/:column
pub async fn get_distribution(
    State(state): State<AppState>,
    Path(column): Path<String>,
    Query(selections): Query<Selections>,
) -> ApiResult<Json<DistributionResponse>> {
    let full = state.dataset.table().await?;
    if !numeric_distribution_columns(&full).contains(&column) {
        if full.has_column(&column) {
            return Err(ApiError::BadRequest(format!(
                "Column '{}' has no distribution view",
                column
            )));
        }
        return Err(ApiError::NotFound(format!("Unknown column: {}", column)));
    }

    let table = filtered(&state, &selections).await?;
    // The filter may leave too few distinct values to summarize
    if !numeric_distribution_columns(&table).contains(&column) {
        return Ok(Json(DistributionResponse {
            column,
            empty: true,
            groups: Vec::new(),
        }));
    }
    let dist = numeric_distribution(&table, &column)?;
    Ok(Json(DistributionResponse {
        column: dist.column,
        empty: false,
        groups: dist.groups,
    }))
}

#[derive(Debug, Serialize)]
pub struct CategoricalResponse {
    pub column: String,
    pub empty: bool,
    pub rows: Vec<BreakdownRow>,
}

/// GET /api/dashboard/categorical/:column
pub async fn get_categorical(
    State(state): State<AppState>,
    Path(column): Path<String>,
    Query(selections): Query<Selections>,
) -> ApiResult<Json<CategoricalResponse>> {
    let full = state.dataset.table().await?;
    if !full.has_column(&column) {
        return Err(ApiError::NotFound(format!("Unknown column: {}", column)));
    }

    let table = filtered(&state, &selections).await?;
    if table.is_empty() {
        return Ok(Json(CategoricalResponse {
            column,
            empty: true,
            rows: Vec::new(),
        }));
    }
    let breakdown = categorical_breakdown(&table, &column)?;
    Ok(Json(CategoricalResponse {
        column: breakdown.column,
        empty: false,
        rows: breakdown.rows,
    }))
}

#[derive(Debug, Serialize)]
pub struct CorrelationResponse {
    pub empty: bool,
    #[serde(flatten)]
    pub matrix: CorrelationMatrix,
}

/// GET /api/dashboard/correlation
pub async fn get_correlation(
    State(state): State<AppState>,
    Query(selections): Query<Selections>,
) -> ApiResult<Json<CorrelationResponse>> {
    let table = filtered(&state, &selections).await?;
    if table.is_empty() {
        return Ok(Json(CorrelationResponse {
            empty: true,
            matrix: CorrelationMatrix {
                columns: Vec::new(),
                values: Vec::new(),
            },
        }));
    }
    Ok(Json(CorrelationResponse {
        empty: false,
        matrix: correlation_matrix(&table)?,
    }))
}

/// Filtered rows, one page at a time
#[derive(Debug, Serialize)]
pub struct TablePageResponse {
    pub total_rows: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// GET /api/dashboard/table?page=N
pub async fn get_table_page(
    State(state): State<AppState>,
    Query(mut selections): Query<Selections>,
) -> ApiResult<Json<TablePageResponse>> {
    let requested_page = match selections.remove("page") {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| ApiError::BadRequest(format!("Invalid page number: {}", raw)))?,
        None => 1,
    };

    let table = filtered(&state, &selections).await?;
    let pagination = calculate_pagination(table.len(), requested_page);

    Ok(Json(TablePageResponse {
        total_rows: table.len(),
        page: pagination.page,
        page_size: PAGE_SIZE,
        total_pages: pagination.total_pages,
        columns: table.columns().to_vec(),
        rows: table.rows()[pagination.rows(table.len())].to_vec(),
    }))
}
