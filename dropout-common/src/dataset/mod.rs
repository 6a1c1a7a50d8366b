//! Dataset loading and normalization
//!
//! Turns the semicolon-delimited student dataset into a typed [`DataTable`]:
//! - Column names are trimmed, spaces become `_`, parentheses are stripped
//! - The `Status` label column is whitespace-trimmed (warning if absent)
//! - Known numeric columns are coerced; non-numeric cells become [`Cell::Missing`]

pub mod analytics;

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Label column holding the outcome (`Dropout`, `Graduate`, `Enrolled`)
pub const LABEL_COLUMN: &str = "Status";

/// Field delimiter of the dataset file
pub const DELIMITER: u8 = b';';

/// Columns coerced to numbers after loading (names after normalization)
pub const NUMERIC_COLUMNS: &[&str] = &[
    "Previous_qualification_grade",
    "Admission_grade",
    "Curricular_units_1st_sem_grade",
    "Curricular_units_2nd_sem_grade",
    "Age_at_enrollment",
    "Unemployment_rate",
    "Inflation_rate",
    "GDP",
    "Curricular_units_1st_sem_credited",
    "Curricular_units_1st_sem_enrolled",
    "Curricular_units_1st_sem_evaluations",
    "Curricular_units_1st_sem_approved",
    "Curricular_units_2nd_sem_credited",
    "Curricular_units_2nd_sem_enrolled",
    "Curricular_units_2nd_sem_evaluations",
    "Curricular_units_2nd_sem_approved",
    "Application_order",
];

/// Dataset errors
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Dataset file does not exist
    #[error("Dataset file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// File exists but could not be read or parsed as delimited text
    #[error("Failed to read dataset {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Two raw column names normalize to the same name
    #[error("Columns '{first}' and '{second}' both normalize to '{normalized}'")]
    ColumnCollision {
        first: String,
        second: String,
        normalized: String,
    },

    /// A column name is empty after normalization
    #[error("Column '{0}' has an empty name after normalization")]
    EmptyColumnName(String),

    /// A row does not have one cell per column
    #[error("Row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
}

/// One typed table cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    /// Type a raw field: empty → missing, parseable → number, else text
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_nan() => Cell::Missing,
            Ok(v) => Cell::Number(v),
            Err(_) => Cell::Text(raw.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// Key used for distinct-value counting and equality filters
    pub fn display_key(&self) -> Option<String> {
        match self {
            Cell::Number(v) => Some(v.to_string()),
            Cell::Text(s) => Some(s.clone()),
            Cell::Missing => None,
        }
    }
}

/// Column-oriented view over a loaded dataset
///
/// Invariant: column names are unique and every row has one cell per column.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl DataTable {
    /// Table with no columns and no rows ("no data available")
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table, checking column uniqueness and row widths
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, DatasetError> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for name in &columns {
            if name.is_empty() {
                return Err(DatasetError::EmptyColumnName(name.clone()));
            }
            if let Some(first) = seen.insert(name.as_str(), name.as_str()) {
                return Err(DatasetError::ColumnCollision {
                    first: first.to_string(),
                    second: name.clone(),
                    normalized: name.clone(),
                });
            }
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(DatasetError::RaggedRow {
                    row: i + 1,
                    found: row.len(),
                    expected: columns.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no rows. A table without columns is also empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cells of one column, top to bottom
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Cell> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// A column holding at least one text cell (pandas "object" dtype)
    pub fn is_text_column(&self, idx: usize) -> bool {
        self.rows.iter().any(|row| matches!(row[idx], Cell::Text(_)))
    }

    /// A column with at least one number and no text cells
    pub fn is_numeric_column(&self, idx: usize) -> bool {
        let mut any_number = false;
        for row in &self.rows {
            match row[idx] {
                Cell::Text(_) => return false,
                Cell::Number(_) => any_number = true,
                Cell::Missing => {}
            }
        }
        any_number
    }

    /// Count of distinct non-missing values in a column
    pub fn distinct_count(&self, idx: usize) -> usize {
        let mut values: Vec<String> = self
            .rows
            .iter()
            .filter_map(|row| row[idx].display_key())
            .collect();
        values.sort();
        values.dedup();
        values.len()
    }

    /// New table holding the rows for which `keep` returns true
    pub fn filter_rows<F>(&self, mut keep: F) -> DataTable
    where
        F: FnMut(&[Cell]) -> bool,
    {
        DataTable {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|r| keep(r.as_slice()))
                .cloned()
                .collect(),
        }
    }
}

/// Result of a successful dataset load
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub table: DataTable,
    /// Non-fatal diagnostics (missing label column, coerced cells)
    pub warnings: Vec<String>,
}

/// Normalize a raw header: trim, collapse spaces to `_`, strip parentheses
pub fn normalize_column_name(raw: &str) -> String {
    raw.trim()
        .split(' ')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .replace(['(', ')'], "")
}

/// Normalize all headers, failing on collisions
pub fn normalize_columns(raw: &[String]) -> Result<Vec<String>, DatasetError> {
    let mut origin: HashMap<String, &str> = HashMap::new();
    let mut out = Vec::with_capacity(raw.len());

    for name in raw {
        let normalized = normalize_column_name(name);
        if normalized.is_empty() {
            return Err(DatasetError::EmptyColumnName(name.clone()));
        }
        if let Some(first) = origin.get(&normalized) {
            return Err(DatasetError::ColumnCollision {
                first: first.to_string(),
                second: name.clone(),
                normalized,
            });
        }
        origin.insert(normalized.clone(), name.as_str());
        out.push(normalized);
    }

    Ok(out)
}

/// Load and normalize the dataset at `path`
pub fn load_dataset(path: &Path) -> Result<LoadedDataset, DatasetError> {
    if !path.exists() {
        return Err(DatasetError::NotFound(path.to_path_buf()));
    }

    let read_err = |source: csv::Error| DatasetError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(true)
        .from_path(path)
        .map_err(read_err)?;

    let raw_headers: Vec<String> = reader
        .headers()
        .map_err(read_err)?
        .iter()
        .map(str::to_string)
        .collect();
    let columns = normalize_columns(&raw_headers)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(read_err)?;
        rows.push(record.iter().map(Cell::parse).collect::<Vec<_>>());
    }

    let mut table = DataTable::new(columns, rows)?;
    let mut warnings = Vec::new();

    match table.column_index(LABEL_COLUMN) {
        Some(idx) => trim_text_column(&mut table, idx),
        None => {
            let msg = format!(
                "Column '{}' not found in dataset; status-based analytics will be unavailable",
                LABEL_COLUMN
            );
            warn!("{}", msg);
            warnings.push(msg);
        }
    }

    let coerced = coerce_numeric_columns(&mut table);
    for (column, count) in coerced {
        let msg = format!(
            "Column '{}': {} non-numeric value(s) replaced with missing",
            column, count
        );
        warn!("{}", msg);
        warnings.push(msg);
    }

    info!(
        "Loaded dataset {} ({} rows, {} columns)",
        path.display(),
        table.len(),
        table.columns().len()
    );

    Ok(LoadedDataset { table, warnings })
}

fn trim_text_column(table: &mut DataTable, idx: usize) {
    for row in &mut table.rows {
        if let Cell::Text(s) = &row[idx] {
            let trimmed = s.trim();
            if trimmed.len() != s.len() {
                row[idx] = Cell::Text(trimmed.to_string());
            }
        }
    }
}

/// Replace text cells in [`NUMERIC_COLUMNS`] with missing
///
/// Returns `(column, replaced_count)` for every column that needed it.
pub fn coerce_numeric_columns(table: &mut DataTable) -> Vec<(String, usize)> {
    let mut report = Vec::new();

    for &name in NUMERIC_COLUMNS {
        let Some(idx) = table.column_index(name) else {
            continue;
        };
        let mut replaced = 0;
        for row in &mut table.rows {
            if let Cell::Text(_) = row[idx] {
                row[idx] = Cell::Missing;
                replaced += 1;
            }
        }
        if replaced > 0 {
            debug!("Coerced {} cells in column {}", replaced, name);
            report.push((name.to_string(), replaced));
        }
    }

    report
}
