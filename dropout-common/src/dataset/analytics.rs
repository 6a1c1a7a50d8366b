//! Descriptive analytics over the normalized dataset
//!
//! Everything here is a pure function of a [`DataTable`]. The results are
//! plain serializable structs that the dashboard front-end charts.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use super::{Cell, DataTable, LABEL_COLUMN};

/// Filter option meaning "do not filter on this column"
pub const ALL_OPTION: &str = "All";

/// Text columns with fewer distinct values than this are offered as filters
pub const FILTER_MAX_DISTINCT: usize = 20;

/// Text columns with fewer distinct values than this can be broken down by status
pub const BREAKDOWN_MAX_DISTINCT: usize = 15;

pub const DROPOUT_LABEL: &str = "Dropout";
pub const GRADUATE_LABEL: &str = "Graduate";

/// Numeric columns offered for per-status distribution summaries
pub const DISTRIBUTION_COLUMNS: &[&str] = &[
    "Admission_grade",
    "Previous_qualification_grade",
    "Age_at_enrollment",
    "Curricular_units_1st_sem_grade",
    "Curricular_units_1st_sem_approved",
    "Curricular_units_2nd_sem_grade",
    "Curricular_units_2nd_sem_approved",
];

/// Analytics errors
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// The label column is required for this view
    #[error("Column '{LABEL_COLUMN}' not found in dataset")]
    MissingLabelColumn,

    /// A requested column does not exist
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// The column exists but is not usable for this view
    #[error("Column '{column}' is not supported here: {reason}")]
    UnsupportedColumn { column: String, reason: String },

    /// Correlation needs at least two numeric columns
    #[error("Not enough numeric columns for a correlation matrix (found {0})")]
    NotEnoughNumericColumns(usize),
}

/// A categorical column the dashboard can filter on
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FilterColumn {
    pub column: String,
    /// `All` first, then the sorted distinct values
    pub options: Vec<String>,
}

/// Headline numbers for the (filtered) dataset
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Kpis {
    pub total_students: usize,
    pub dropout_count: usize,
    /// Percentage in [0, 100]; absent when there are no rows
    pub dropout_rate_pct: Option<f64>,
    pub avg_admission_grade_graduate: Option<f64>,
    pub avg_admission_grade_dropout: Option<f64>,
    /// Dropout mean minus graduate mean
    pub admission_grade_delta: Option<f64>,
    pub avg_approved_1st_sem_graduate: Option<f64>,
    pub avg_approved_1st_sem_dropout: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusCount {
    pub status: String,
    pub count: usize,
}

/// Five-number summary plus mean for one status group
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GroupSummary {
    pub status: String,
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NumericDistribution {
    pub column: String,
    pub groups: Vec<GroupSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BreakdownRow {
    pub category: String,
    pub status: String,
    pub count: usize,
    /// Share of this status within its category, in percent
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoricalBreakdown {
    pub column: String,
    pub rows: Vec<BreakdownRow>,
}

/// Pearson correlation over the numeric columns; `None` where undefined
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

fn require_column(table: &DataTable, column: &str) -> Result<usize, AnalyticsError> {
    table
        .column_index(column)
        .ok_or_else(|| AnalyticsError::UnknownColumn(column.to_string()))
}

fn label_index(table: &DataTable) -> Result<usize, AnalyticsError> {
    table
        .column_index(LABEL_COLUMN)
        .ok_or(AnalyticsError::MissingLabelColumn)
}

fn sorted_distinct(table: &DataTable, idx: usize) -> Vec<String> {
    table
        .rows()
        .iter()
        .filter_map(|row| row[idx].display_key())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Text columns (other than the label) with fewer than 20 distinct values
pub fn categorical_filter_columns(table: &DataTable) -> Vec<FilterColumn> {
    table
        .columns()
        .iter()
        .enumerate()
        .filter(|(idx, name)| {
            name.as_str() != LABEL_COLUMN
                && table.is_text_column(*idx)
                && table.distinct_count(*idx) < FILTER_MAX_DISTINCT
        })
        .map(|(idx, name)| {
            let mut options = vec![ALL_OPTION.to_string()];
            options.extend(sorted_distinct(table, idx));
            FilterColumn {
                column: name.clone(),
                options,
            }
        })
        .collect()
}

/// Keep rows matching every non-`All` selection
pub fn apply_filters(
    table: &DataTable,
    selections: &BTreeMap<String, String>,
) -> Result<DataTable, AnalyticsError> {
    let mut active = Vec::new();
    for (column, value) in selections {
        if value == ALL_OPTION {
            continue;
        }
        active.push((require_column(table, column)?, value.as_str()));
    }

    if active.is_empty() {
        return Ok(table.clone());
    }

    Ok(table.filter_rows(|row| {
        active
            .iter()
            .all(|(idx, value)| row[*idx].display_key().as_deref() == Some(*value))
    }))
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Numeric values of `column` in rows whose status equals `status`
fn values_for_status(table: &DataTable, label: usize, column: &str, status: &str) -> Vec<f64> {
    let Some(idx) = table.column_index(column) else {
        return Vec::new();
    };
    table
        .rows()
        .iter()
        .filter(|row| row[label].as_text() == Some(status))
        .filter_map(|row| row[idx].as_f64())
        .collect()
}

/// Dropout rate and per-outcome averages
pub fn compute_kpis(table: &DataTable) -> Result<Kpis, AnalyticsError> {
    let label = label_index(table)?;

    let total_students = table.len();
    let dropout_count = table
        .rows()
        .iter()
        .filter(|row| row[label].as_text() == Some(DROPOUT_LABEL))
        .count();
    let dropout_rate_pct = if total_students > 0 {
        Some(dropout_count as f64 / total_students as f64 * 100.0)
    } else {
        None
    };

    let avg_admission_grade_graduate =
        mean(&values_for_status(table, label, "Admission_grade", GRADUATE_LABEL));
    let avg_admission_grade_dropout =
        mean(&values_for_status(table, label, "Admission_grade", DROPOUT_LABEL));
    let admission_grade_delta = match (avg_admission_grade_dropout, avg_admission_grade_graduate) {
        (Some(d), Some(g)) => Some(d - g),
        _ => None,
    };

    Ok(Kpis {
        total_students,
        dropout_count,
        dropout_rate_pct,
        avg_admission_grade_graduate,
        avg_admission_grade_dropout,
        admission_grade_delta,
        avg_approved_1st_sem_graduate: mean(&values_for_status(
            table,
            label,
            "Curricular_units_1st_sem_approved",
            GRADUATE_LABEL,
        )),
        avg_approved_1st_sem_dropout: mean(&values_for_status(
            table,
            label,
            "Curricular_units_1st_sem_approved",
            DROPOUT_LABEL,
        )),
    })
}

/// Count per status, largest first (ties by name)
pub fn status_distribution(table: &DataTable) -> Result<Vec<StatusCount>, AnalyticsError> {
    let label = label_index(table)?;

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for row in table.rows() {
        if let Some(key) = row[label].display_key() {
            *counts.entry(key).or_default() += 1;
        }
    }

    let mut out: Vec<StatusCount> = counts
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.status.cmp(&b.status)));
    Ok(out)
}

/// Distribution columns present in the table with more than one distinct value
pub fn numeric_distribution_columns(table: &DataTable) -> Vec<String> {
    DISTRIBUTION_COLUMNS
        .iter()
        .filter_map(|name| {
            let idx = table.column_index(name)?;
            (table.distinct_count(idx) > 1).then(|| name.to_string())
        })
        .collect()
}

/// Linear-interpolated quantile of an ascending slice
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Per-status summary of one numeric column
pub fn numeric_distribution(
    table: &DataTable,
    column: &str,
) -> Result<NumericDistribution, AnalyticsError> {
    let label = label_index(table)?;
    let idx = require_column(table, column)?;

    if !DISTRIBUTION_COLUMNS.contains(&column) {
        return Err(AnalyticsError::UnsupportedColumn {
            column: column.to_string(),
            reason: "not a distribution column".to_string(),
        });
    }
    if table.distinct_count(idx) <= 1 {
        return Err(AnalyticsError::UnsupportedColumn {
            column: column.to_string(),
            reason: "fewer than two distinct values".to_string(),
        });
    }

    let mut by_status: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in table.rows() {
        if let (Some(status), Cell::Number(v)) = (row[label].display_key(), &row[idx]) {
            by_status.entry(status).or_default().push(*v);
        }
    }

    let groups = by_status
        .into_iter()
        .map(|(status, mut values)| {
            values.sort_by(f64::total_cmp);
            GroupSummary {
                count: values.len(),
                mean: values.iter().sum::<f64>() / values.len() as f64,
                min: values[0],
                q1: quantile(&values, 0.25),
                median: quantile(&values, 0.5),
                q3: quantile(&values, 0.75),
                max: values[values.len() - 1],
                status,
            }
        })
        .collect();

    Ok(NumericDistribution {
        column: column.to_string(),
        groups,
    })
}

/// Text columns (other than the label) with fewer than 15 distinct values
pub fn categorical_breakdown_columns(table: &DataTable) -> Vec<String> {
    table
        .columns()
        .iter()
        .enumerate()
        .filter(|(idx, name)| {
            name.as_str() != LABEL_COLUMN
                && table.is_text_column(*idx)
                && table.distinct_count(*idx) < BREAKDOWN_MAX_DISTINCT
        })
        .map(|(_, name)| name.clone())
        .collect()
}

/// Status counts and within-category percentages for one categorical column
pub fn categorical_breakdown(
    table: &DataTable,
    column: &str,
) -> Result<CategoricalBreakdown, AnalyticsError> {
    let label = label_index(table)?;
    let idx = require_column(table, column)?;

    if !categorical_breakdown_columns(table).iter().any(|c| c == column) {
        return Err(AnalyticsError::UnsupportedColumn {
            column: column.to_string(),
            reason: format!(
                "not a text column with fewer than {} distinct values",
                BREAKDOWN_MAX_DISTINCT
            ),
        });
    }

    let mut counts: BTreeMap<(String, String), usize> = BTreeMap::new();
    let mut totals: BTreeMap<String, usize> = BTreeMap::new();
    for row in table.rows() {
        if let (Some(category), Some(status)) = (row[idx].display_key(), row[label].display_key()) {
            *totals.entry(category.clone()).or_default() += 1;
            *counts.entry((category, status)).or_default() += 1;
        }
    }

    let rows = counts
        .into_iter()
        .map(|((category, status), count)| {
            let total = totals.get(&category).copied().unwrap_or(count);
            BreakdownRow {
                percentage: count as f64 / total as f64 * 100.0,
                category,
                status,
                count,
            }
        })
        .collect();

    Ok(CategoricalBreakdown {
        column: column.to_string(),
        rows,
    })
}

fn pearson(xs: &[Option<f64>], ys: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut vx, mut vy) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        cov += (x - mx) * (y - my);
        vx += (x - mx) * (x - mx);
        vy += (y - my) * (y - my);
    }
    if vx == 0.0 || vy == 0.0 {
        return None;
    }
    Some((cov / (vx.sqrt() * vy.sqrt())).clamp(-1.0, 1.0))
}

/// Pairwise-complete Pearson correlation of every numeric column
pub fn correlation_matrix(table: &DataTable) -> Result<CorrelationMatrix, AnalyticsError> {
    let numeric: Vec<usize> = (0..table.columns().len())
        .filter(|idx| table.is_numeric_column(*idx))
        .collect();
    if numeric.len() < 2 {
        return Err(AnalyticsError::NotEnoughNumericColumns(numeric.len()));
    }

    let series: Vec<Vec<Option<f64>>> = numeric
        .iter()
        .map(|idx| table.rows().iter().map(|row| row[*idx].as_f64()).collect())
        .collect();

    let k = numeric.len();
    let mut values = vec![vec![None; k]; k];
    for i in 0..k {
        for j in i..k {
            let r = pearson(&series[i], &series[j]);
            let r = if i == j { r.map(|_| 1.0) } else { r };
            values[i][j] = r;
            values[j][i] = r;
        }
    }

    Ok(CorrelationMatrix {
        columns: numeric
            .iter()
            .map(|idx| table.columns()[*idx].clone())
            .collect(),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn sample_table() -> DataTable {
        DataTable::new(
            vec![
                "Gender_label".to_string(),
                "Admission_grade".to_string(),
                "Curricular_units_1st_sem_approved".to_string(),
                "Status".to_string(),
            ],
            vec![
                vec![text("M"), Cell::Number(120.0), Cell::Number(6.0), text("Graduate")],
                vec![text("F"), Cell::Number(140.0), Cell::Number(5.0), text("Graduate")],
                vec![text("M"), Cell::Number(100.0), Cell::Number(1.0), text("Dropout")],
                vec![text("F"), Cell::Missing, Cell::Number(0.0), text("Dropout")],
                vec![text("F"), Cell::Number(130.0), Cell::Number(4.0), text("Enrolled")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_filter_columns_exclude_label() {
        let table = sample_table();
        let filters = categorical_filter_columns(&table);
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].column, "Gender_label");
        assert_eq!(filters[0].options, vec!["All", "F", "M"]);
    }

    #[test]
    fn test_apply_filters() {
        let table = sample_table();
        let mut sel = BTreeMap::new();
        sel.insert("Gender_label".to_string(), "M".to_string());
        assert_eq!(apply_filters(&table, &sel).unwrap().len(), 2);

        sel.insert("Gender_label".to_string(), ALL_OPTION.to_string());
        assert_eq!(apply_filters(&table, &sel).unwrap().len(), 5);

        sel.insert("Nope".to_string(), "x".to_string());
        assert!(matches!(
            apply_filters(&table, &sel),
            Err(AnalyticsError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_kpis() {
        let kpis = compute_kpis(&sample_table()).unwrap();
        assert_eq!(kpis.total_students, 5);
        assert_eq!(kpis.dropout_count, 2);
        assert_eq!(kpis.dropout_rate_pct, Some(40.0));
        assert_eq!(kpis.avg_admission_grade_graduate, Some(130.0));
        // Missing admission grade is skipped, not counted as zero
        assert_eq!(kpis.avg_admission_grade_dropout, Some(100.0));
        assert_eq!(kpis.admission_grade_delta, Some(-30.0));
        assert_eq!(kpis.avg_approved_1st_sem_dropout, Some(0.5));
    }

    #[test]
    fn test_kpis_on_empty_filter_result() {
        let empty = sample_table().filter_rows(|_| false);
        let kpis = compute_kpis(&empty).unwrap();
        assert_eq!(kpis.total_students, 0);
        assert_eq!(kpis.dropout_rate_pct, None);
        assert_eq!(kpis.avg_admission_grade_graduate, None);
    }

    #[test]
    fn test_kpis_require_label() {
        let table = DataTable::new(vec!["a".to_string()], vec![]).unwrap();
        assert!(matches!(
            compute_kpis(&table),
            Err(AnalyticsError::MissingLabelColumn)
        ));
    }

    #[test]
    fn test_status_distribution_order() {
        let dist = status_distribution(&sample_table()).unwrap();
        assert_eq!(dist[0].status, "Dropout");
        assert_eq!(dist[0].count, 2);
        assert_eq!(dist[1].status, "Graduate");
        assert_eq!(dist[2].status, "Enrolled");
    }

    #[test]
    fn test_numeric_distribution() {
        let dist = numeric_distribution(&sample_table(), "Admission_grade").unwrap();
        let grad = dist.groups.iter().find(|g| g.status == "Graduate").unwrap();
        assert_eq!(grad.count, 2);
        assert_eq!(grad.median, 130.0);
        assert_eq!(grad.q1, 125.0);
        assert_eq!(grad.min, 120.0);
        assert_eq!(grad.max, 140.0);
    }

    #[test]
    fn test_numeric_distribution_rejects_other_columns() {
        let err = numeric_distribution(&sample_table(), "Gender_label").unwrap_err();
        assert!(matches!(err, AnalyticsError::UnsupportedColumn { .. }));
    }

    #[test]
    fn test_categorical_breakdown_percentages() {
        let breakdown = categorical_breakdown(&sample_table(), "Gender_label").unwrap();
        let f_dropout = breakdown
            .rows
            .iter()
            .find(|r| r.category == "F" && r.status == "Dropout")
            .unwrap();
        assert_eq!(f_dropout.count, 1);
        assert!((f_dropout.percentage - 100.0 / 3.0).abs() < 1e-9);

        let m_total: f64 = breakdown
            .rows
            .iter()
            .filter(|r| r.category == "M")
            .map(|r| r.percentage)
            .sum();
        assert!((m_total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_correlation_matrix() {
        let corr = correlation_matrix(&sample_table()).unwrap();
        assert_eq!(
            corr.columns,
            vec!["Admission_grade", "Curricular_units_1st_sem_approved"]
        );
        assert_eq!(corr.values[0][0], Some(1.0));
        let r = corr.values[0][1].unwrap();
        assert!(r > 0.0 && r <= 1.0);
        assert_eq!(corr.values[0][1], corr.values[1][0]);
    }

    #[test]
    fn test_correlation_needs_two_numeric_columns() {
        let table = DataTable::new(
            vec!["x".to_string()],
            vec![vec![Cell::Number(1.0)]],
        )
        .unwrap();
        assert!(matches!(
            correlation_matrix(&table),
            Err(AnalyticsError::NotEnoughNumericColumns(1))
        ));
    }
}
