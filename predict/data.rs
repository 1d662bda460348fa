//! # Upload Loading Module
//!
//! This module is the entry point for user-provided campaign records. It reads
//! comma-separated files with a header row and turns them into a [`RawTable`]:
//! an ordered header plus rows of loosely typed cells.
//!
//! - No Schema Enforcement: Uploads are not checked against the model's
//!   feature schema here. Reconciling columns is the job of the aligner.
//! - Type Inference: Column types come from the `polars` CSV reader. Numeric
//!   and boolean columns become numbers, everything else stays text.
//! - User-Centric Errors: Malformed files surface as a `DataError` before any
//!   prediction work starts.

use polars::prelude::*;
use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

/// A single cell of an uploaded table.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Missing,
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Interprets the cell as a number. Text is accepted when it parses as a
    /// float or spells a boolean.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Missing => None,
            RawValue::Number(value) => Some(*value),
            RawValue::Text(text) => {
                let trimmed = text.trim();
                match trimmed.to_ascii_lowercase().as_str() {
                    "true" => Some(1.0),
                    "false" => Some(0.0),
                    _ => trimmed.parse::<f64>().ok(),
                }
            }
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, RawValue::Missing)
    }

    /// The category label used when this cell is one-hot encoded.
    pub fn label(&self) -> Cow<'_, str> {
        match self {
            RawValue::Missing => Cow::Borrowed(""),
            RawValue::Number(value) => Cow::Owned(format_number(*value)),
            RawValue::Text(text) => Cow::Borrowed(text.as_str()),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Missing => Ok(()),
            RawValue::Number(value) => f.write_str(&format_number(*value)),
            RawValue::Text(text) => f.write_str(text),
        }
    }
}

/// Renders integral values without a fractional part (`3` rather than `3.0`).
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

/// An uploaded table: an ordered header and rows of the same width.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<RawValue>>,
}

/// A comprehensive error type for all upload parsing failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("The uploaded file has no columns. Please upload a CSV file with a header row.")]
    NoColumns,
    #[error("The column '{0}' appears more than once in the header.")]
    DuplicateColumn(String),
    #[error("Row {row} has {found} values, but the header declares {expected} columns.")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
}

impl RawTable {
    /// Builds a table from a header and rows, checking that the header is
    /// unique and every row has one cell per column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<RawValue>>) -> Result<Self, DataError> {
        if columns.is_empty() {
            return Err(DataError::NoColumns);
        }
        let mut seen = ahash::AHashSet::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(DataError::DuplicateColumn(name.clone()));
            }
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(DataError::RaggedRow {
                    row: i + 1,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    /// Wraps columns and rows that are already unique and rectangular. Unlike
    /// [`RawTable::new`] this allows a table with no columns.
    pub(crate) fn from_checked(columns: Vec<String>, rows: Vec<Vec<RawValue>>) -> Self {
        debug_assert!(rows.iter().all(|row| row.len() == columns.len()));
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<RawValue>] {
        &self.rows
    }

    /// Number of data rows.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterates over the cells of one column, top to bottom.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &RawValue> + '_ {
        self.rows.iter().map(move |row| &row[index])
    }

    /// A table holding only the first `n` rows, used for upload previews.
    pub fn head(&self, n: usize) -> RawTable {
        RawTable {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// A copy of the table without the named column; unchanged when absent.
    pub fn without_column(&self, name: &str) -> RawTable {
        let Some(skip) = self.column_index(name) else {
            return self.clone();
        };
        RawTable {
            columns: self
                .columns
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, c)| c.clone())
                .collect(),
            rows: self
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .filter(|(i, _)| *i != skip)
                        .map(|(_, v)| v.clone())
                        .collect()
                })
                .collect(),
        }
    }
}

/// Loads an uploaded CSV file from disk.
pub fn load_raw_table(path: &Path) -> Result<RawTable, DataError> {
    log::info!("Loading upload from '{}'", path.display());
    let df = CsvReader::new(File::open(path)?)
        .with_options(internal::read_options())
        .finish()?;
    internal::frame_to_table(&df)
}

/// Parses CSV content already held in memory.
pub fn parse_raw_table(bytes: Vec<u8>) -> Result<RawTable, DataError> {
    let df = CsvReader::new(Cursor::new(bytes))
        .with_options(internal::read_options())
        .finish()?;
    internal::frame_to_table(&df)
}

/// Internal module for the DataFrame to RawTable conversion.
mod internal {
    use super::*;

    pub(super) fn read_options() -> CsvReadOptions {
        CsvReadOptions::default()
            .with_has_header(true)
            .with_parse_options(CsvParseOptions::default().with_separator(b','))
    }

    fn is_numeric(dtype: &DataType) -> bool {
        matches!(
            dtype,
            DataType::Boolean
                | DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64
                | DataType::Float32
                | DataType::Float64
        )
    }

    fn extract_cells(column: &Column) -> Result<Vec<RawValue>, DataError> {
        if is_numeric(column.dtype()) {
            let casted = column.cast(&DataType::Float64)?;
            let cells = casted
                .f64()?
                .into_iter()
                .map(|value| value.map_or(RawValue::Missing, RawValue::Number))
                .collect();
            return Ok(cells);
        }

        let casted = column.cast(&DataType::String)?;
        let cells = casted
            .str()?
            .into_iter()
            .map(|value| match value {
                Some(text) if !text.trim().is_empty() => RawValue::Text(text.to_string()),
                _ => RawValue::Missing,
            })
            .collect();
        Ok(cells)
    }

    pub(super) fn frame_to_table(df: &DataFrame) -> Result<RawTable, DataError> {
        let frame_columns = df.get_columns();
        if frame_columns.is_empty() {
            return Err(DataError::NoColumns);
        }

        let names: Vec<String> = frame_columns
            .iter()
            .map(|column| column.name().to_string())
            .collect();

        let mut cells_by_column = Vec::with_capacity(frame_columns.len());
        for column in frame_columns {
            cells_by_column.push(extract_cells(column)?);
        }

        let height = df.height();
        let mut rows: Vec<Vec<RawValue>> = (0..height)
            .map(|_| Vec::with_capacity(names.len()))
            .collect();
        for cells in cells_by_column {
            for (row, cell) in rows.iter_mut().zip(cells) {
                row.push(cell);
            }
        }

        log::debug!("Parsed {} rows across {} columns", height, names.len());
        RawTable::new(names, rows)
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use tempfile::NamedTempFile;

    /// A robust helper to create a temporary CSV file for testing.
    fn create_test_csv(content: &str) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn test_load_mixed_column_types() {
        let content = "Campaign_ID,Campaign_Type,Engagement_Score,Active\n\
                       1,Email,0.5,true\n\
                       2,Social,0.75,false";
        let file = create_test_csv(content).unwrap();
        let table = load_raw_table(file.path()).unwrap();

        assert_eq!(
            table.columns(),
            &["Campaign_ID", "Campaign_Type", "Engagement_Score", "Active"]
        );
        assert_eq!(table.height(), 2);
        assert_eq!(table.rows()[0][0], RawValue::Number(1.0));
        assert_eq!(table.rows()[0][1], RawValue::Text("Email".to_string()));
        assert_eq!(table.rows()[1][2], RawValue::Number(0.75));
        assert_eq!(table.rows()[1][3], RawValue::Number(0.0));
    }

    #[test]
    fn test_empty_fields_become_missing() {
        let table = parse_raw_table(b"a,b\n1,x\n,\n3,z\n".to_vec()).unwrap();
        assert_eq!(table.height(), 3);
        assert!(table.rows()[1][0].is_missing());
        assert!(table.rows()[1][1].is_missing());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_raw_table(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, DataError::IoError(_)), "got {err:?}");
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = RawTable::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![RawValue::Number(1.0)]],
        )
        .unwrap_err();
        match err {
            DataError::RaggedRow {
                row,
                expected,
                found,
            } => {
                assert_eq!((row, expected, found), (1, 2, 1));
            }
            other => panic!("Expected RaggedRow, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_header_rejected() {
        let err = RawTable::new(vec!["a".to_string(), "a".to_string()], vec![]).unwrap_err();
        assert!(matches!(err, DataError::DuplicateColumn(name) if name == "a"));
    }

    #[test]
    fn test_text_cells_coerce_to_numbers() {
        assert_eq!(RawValue::Text(" 2.5 ".to_string()).as_number(), Some(2.5));
        assert_eq!(RawValue::Text("TRUE".to_string()).as_number(), Some(1.0));
        assert_eq!(RawValue::Text("Email".to_string()).as_number(), None);
        assert_eq!(RawValue::Missing.as_number(), None);
    }

    #[test]
    fn test_number_labels_drop_trailing_zero() {
        assert_eq!(RawValue::Number(3.0).label(), "3");
        assert_eq!(RawValue::Number(0.25).label(), "0.25");
        assert_eq!(format_number(-7.0), "-7");
    }

    #[test]
    fn test_head_keeps_header() {
        let table = parse_raw_table(b"a\n1\n2\n3\n".to_vec()).unwrap();
        let preview = table.head(2);
        assert_eq!(preview.columns(), table.columns());
        assert_eq!(preview.height(), 2);
    }

    #[test]
    fn test_without_column() {
        let table = parse_raw_table(b"a,b,c\n1,x,3\n".to_vec()).unwrap();
        let trimmed = table.without_column("b");
        assert_eq!(trimmed.columns(), &["a", "c"]);
        assert_eq!(trimmed.rows()[0], vec![RawValue::Number(1.0), RawValue::Number(3.0)]);
        assert_eq!(table.without_column("zzz"), table);
    }
}
