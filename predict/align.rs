//! # Schema Alignment Module
//!
//! Reconciles an arbitrary uploaded table with the fixed feature schema of a
//! pretrained model. The steps always run in the same order:
//!
//! 1. Drop identifier columns (best effort, absence is fine).
//! 2. Expand categorical columns into indicator columns named
//!    `<column>_<level>`, dropping the first sorted level.
//! 3. Fill every expected column that is still missing.
//! 4. Drop every column the model does not expect.
//! 5. Order the remaining columns exactly as the schema does.
//!
//! The result is an [`AlignedFeatureMatrix`], which can only be produced here
//! and is read-only afterwards.

use crate::data::{RawTable, RawValue, format_number};
use crate::model::FeatureSchema;
use ahash::{AHashMap, AHashSet};
use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Separator between a categorical column name and its level.
pub const INDICATOR_SEPARATOR: &str = "_";

/// Columns that never carry features in campaign uploads.
pub const DEFAULT_IDENTIFIER_COLUMNS: [&str; 2] = ["Campaign_ID", "Acquisition_Cost"];

/// Columns one-hot encoded before alignment in campaign uploads.
pub const DEFAULT_CATEGORICAL_COLUMNS: [&str; 2] = ["Campaign_Type", "Channel_Used"];

/// The set of columns expanded into indicator columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoricalEncodingSpec {
    columns: Vec<String>,
}

impl CategoricalEncodingSpec {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Name of the indicator column for one level of a categorical column.
    pub fn indicator_name(column: &str, level: &str) -> String {
        format!("{column}{INDICATOR_SEPARATOR}{level}")
    }
}

impl Default for CategoricalEncodingSpec {
    fn default() -> Self {
        Self::new(DEFAULT_CATEGORICAL_COLUMNS.iter().map(|s| s.to_string()).collect())
    }
}

/// How expected-but-absent feature values are filled in.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ImputationPolicy {
    #[default]
    Zero,
    Constant {
        value: f64,
    },
    /// Use the fill values stored in the model artifact, zero where none is stored.
    ModelDefaults,
}

/// Everything the aligner needs besides the table and the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentConfig {
    pub identifier_columns: Vec<String>,
    pub encoding: CategoricalEncodingSpec,
    pub imputation: ImputationPolicy,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            identifier_columns: DEFAULT_IDENTIFIER_COLUMNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            encoding: CategoricalEncodingSpec::default(),
            imputation: ImputationPolicy::Zero,
        }
    }
}

/// A numeric matrix whose column `i` is always `columns[i]` of the schema it
/// was aligned against.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedFeatureMatrix {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl AlignedFeatureMatrix {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.values.row(index)
    }

    /// Presents the matrix as an upload again, one numeric cell per feature.
    pub fn to_raw_table(&self) -> RawTable {
        let rows = self
            .values
            .outer_iter()
            .map(|row| row.iter().map(|&v| RawValue::Number(v)).collect())
            .collect();
        RawTable::new(self.columns.clone(), rows)
            .expect("schema columns are unique and rows match the schema width")
    }
}

/// Errors raised while aligning an upload.
#[derive(Error, Debug, PartialEq)]
pub enum AlignError {
    #[error(
        "The categorical column '{0}' is required for encoding but was not found in the upload."
    )]
    MissingCategorical(String),
    #[error(
        "The column '{column}' contains the non-numeric value '{value}' at row {row}. The model only accepts numeric features."
    )]
    NonNumeric {
        column: String,
        row: usize,
        value: String,
    },
}

/// A column while alignment is in progress: either untouched upload cells
/// or an indicator built during encoding.
enum WorkingColumn {
    Raw(usize),
    Indicator(Vec<f64>),
}

/// Upload columns after steps 1 and 2, in upload order. Indicators stand
/// where their categorical column stood.
type Expanded = Vec<(String, WorkingColumn)>;

/// Aligns uploads against a feature schema under a fixed configuration.
#[derive(Debug, Clone)]
pub struct SchemaAligner {
    config: AlignmentConfig,
    feature_defaults: BTreeMap<String, f64>,
}

impl SchemaAligner {
    pub fn new(config: AlignmentConfig) -> Self {
        Self {
            config,
            feature_defaults: BTreeMap::new(),
        }
    }

    /// Supplies the per-feature fill values used by `ImputationPolicy::ModelDefaults`.
    pub fn with_feature_defaults(mut self, defaults: BTreeMap<String, f64>) -> Self {
        self.feature_defaults = defaults;
        self
    }

    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    fn fill_value(&self, column: &str) -> f64 {
        match self.config.imputation {
            ImputationPolicy::Zero => 0.0,
            ImputationPolicy::Constant { value } => value,
            ImputationPolicy::ModelDefaults => {
                self.feature_defaults.get(column).copied().unwrap_or(0.0)
            }
        }
    }

    /// Produces a matrix whose columns are exactly `schema`, in order.
    pub fn align(
        &self,
        table: &RawTable,
        schema: &FeatureSchema,
    ) -> Result<AlignedFeatureMatrix, AlignError> {
        let expanded = self.expand(table, schema)?;
        self.assemble(table, &expanded, schema)
    }

    /// Like [`SchemaAligner::align`], and also returns the encoded upload:
    /// identifiers dropped, categoricals replaced by their 0/1 indicator
    /// columns, every other column kept as uploaded.
    pub fn align_with_encoded(
        &self,
        table: &RawTable,
        schema: &FeatureSchema,
    ) -> Result<(AlignedFeatureMatrix, RawTable), AlignError> {
        let expanded = self.expand(table, schema)?;
        let matrix = self.assemble(table, &expanded, schema)?;
        Ok((matrix, encoded_table(table, expanded)))
    }

    fn expand(&self, table: &RawTable, schema: &FeatureSchema) -> Result<Expanded, AlignError> {
        // --- 1. Drop identifier columns ---
        let identifiers: AHashSet<&str> = self
            .config
            .identifier_columns
            .iter()
            .map(String::as_str)
            .collect();
        let kept: Vec<(usize, &String)> = table
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, name)| !identifiers.contains(name.as_str()))
            .collect();

        // --- 2. Expand categorical columns ---
        // A table whose columns already are the schema has nothing left to encode.
        let already_aligned =
            kept.len() == schema.len() && kept.iter().all(|(_, name)| schema.contains(name));
        if !already_aligned {
            let absent = self
                .config
                .encoding
                .columns()
                .iter()
                .find(|column| !kept.iter().any(|(_, name)| name == column));
            if let Some(column) = absent {
                return Err(AlignError::MissingCategorical(column.clone()));
            }
        }

        let categorical: AHashSet<&str> = self
            .config
            .encoding
            .columns()
            .iter()
            .map(String::as_str)
            .collect();
        let mut expanded: Expanded = Vec::with_capacity(kept.len());
        for (idx, name) in kept {
            if categorical.contains(name.as_str()) {
                for (indicator, values) in encode_categorical(table, idx, name) {
                    place(&mut expanded, indicator, WorkingColumn::Indicator(values));
                }
            } else {
                place(&mut expanded, name.clone(), WorkingColumn::Raw(idx));
            }
        }
        Ok(expanded)
    }

    fn assemble(
        &self,
        table: &RawTable,
        expanded: &Expanded,
        schema: &FeatureSchema,
    ) -> Result<AlignedFeatureMatrix, AlignError> {
        let n_rows = table.height();
        let current: AHashMap<&str, &WorkingColumn> = expanded
            .iter()
            .map(|(name, column)| (name.as_str(), column))
            .collect();

        // --- 3 & 4. Report missing and extra columns ---
        let missing: Vec<&String> = schema
            .columns()
            .iter()
            .filter(|c| !current.contains_key(c.as_str()))
            .collect();
        let extra: Vec<&str> = current
            .keys()
            .copied()
            .filter(|c| !schema.contains(c))
            .sorted()
            .collect();
        if !missing.is_empty() {
            log::debug!(
                "Filling {} missing feature column(s): {}",
                missing.len(),
                missing.iter().join(", ")
            );
        }
        if !extra.is_empty() {
            log::debug!(
                "Dropping {} column(s) the model does not use: {}",
                extra.len(),
                extra.iter().join(", ")
            );
        }

        // --- 5. Assemble columns in schema order ---
        let mut values = Array2::<f64>::zeros((n_rows, schema.len()));
        for (j, name) in schema.columns().iter().enumerate() {
            let fill = self.fill_value(name);
            let column = match current.get(name.as_str()) {
                None => Array1::from_elem(n_rows, fill),
                Some(WorkingColumn::Indicator(encoded)) => Array1::from_vec(encoded.clone()),
                Some(WorkingColumn::Raw(idx)) => numeric_column(table, *idx, name, fill)?,
            };
            values.column_mut(j).assign(&column);
        }

        Ok(AlignedFeatureMatrix {
            columns: schema.columns().to_vec(),
            values,
        })
    }
}

/// Adds a working column. An indicator replaces an upload column of the same
/// name; an upload column never replaces an indicator.
fn place(expanded: &mut Expanded, name: String, column: WorkingColumn) {
    match expanded.iter().position(|(existing, _)| *existing == name) {
        Some(pos) => {
            if matches!(column, WorkingColumn::Indicator(_)) {
                expanded[pos].1 = column;
            }
        }
        None => expanded.push((name, column)),
    }
}

fn encoded_table(table: &RawTable, expanded: Expanded) -> RawTable {
    let rows = table
        .rows()
        .iter()
        .enumerate()
        .map(|(r, row)| {
            expanded
                .iter()
                .map(|(_, column)| match column {
                    WorkingColumn::Raw(idx) => row[*idx].clone(),
                    WorkingColumn::Indicator(values) => RawValue::Number(values[r]),
                })
                .collect()
        })
        .collect();
    let columns = expanded.into_iter().map(|(name, _)| name).collect();
    RawTable::from_checked(columns, rows)
}

/// Converts one upload column into numbers. Missing cells take `fill`.
fn numeric_column(
    table: &RawTable,
    idx: usize,
    name: &str,
    fill: f64,
) -> Result<Array1<f64>, AlignError> {
    let mut out = Vec::with_capacity(table.height());
    for (row, cell) in table.column_values(idx).enumerate() {
        let value = match cell {
            RawValue::Missing => fill,
            other => other.as_number().ok_or_else(|| AlignError::NonNumeric {
                column: name.to_string(),
                row: row + 1,
                value: other.to_string(),
            })?,
        };
        out.push(value);
    }
    Ok(Array1::from_vec(out))
}

/// Sorted distinct levels of a categorical column. Numeric order applies when
/// every level is a number, lexicographic order otherwise.
fn category_levels<'a>(cells: impl Iterator<Item = &'a RawValue>) -> Vec<String> {
    let present: Vec<&RawValue> = cells.filter(|c| !c.is_missing()).collect();
    let numeric: Option<Vec<f64>> = present
        .iter()
        .map(|c| match c {
            RawValue::Number(v) => Some(*v),
            _ => None,
        })
        .collect();
    match numeric {
        Some(mut numbers) => {
            numbers.sort_by(f64::total_cmp);
            numbers.dedup();
            numbers.into_iter().map(format_number).collect()
        }
        None => present
            .iter()
            .map(|c| c.label().into_owned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    }
}

/// One-hot encodes a column, dropping the first level as the baseline.
fn encode_categorical(table: &RawTable, idx: usize, column: &str) -> Vec<(String, Vec<f64>)> {
    let levels = category_levels(table.column_values(idx));
    log::debug!(
        "Encoding '{}' with {} level(s), baseline {:?}",
        column,
        levels.len(),
        levels.first()
    );
    levels
        .iter()
        .skip(1)
        .map(|level| {
            let values = table
                .column_values(idx)
                .map(|cell| {
                    if !cell.is_missing() && cell.label() == level.as_str() {
                        1.0
                    } else {
                        0.0
                    }
                })
                .collect();
            (CategoricalEncodingSpec::indicator_name(column, level), values)
        })
        .collect()
}
