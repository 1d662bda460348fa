//! Descriptive summaries of a prediction result.
//!
//! Each summary is computed on its own and reports its own error, so a
//! missing column only costs the chart that needs it.

use crate::data::RawValue;
use crate::pipeline::PredictionResult;
use ahash::AHashMap;
use ndarray::Array2;
use thiserror::Error;

pub const DEFAULT_SCATTER_X: &str = "Sentiment_Polarity";
pub const DEFAULT_SCATTER_Y: &str = "Engagement_Score";

#[derive(Error, Debug, PartialEq)]
pub enum SummaryError {
    #[error("The column '{0}' is not present in the uploaded data.")]
    MissingColumn(String),
    #[error("The uploaded data has no numeric columns to correlate.")]
    NoNumericColumns,
    #[error("There are no predictions to summarize.")]
    NoPredictions,
}

/// Number and share of rows predicted with one label.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeCount {
    pub label: String,
    pub count: usize,
    pub share: f64,
}

/// Pairwise Pearson correlations between numeric columns.
#[derive(Debug, Clone)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Array2<f64>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        Some(self.values[[i, j]])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    pub label: String,
}

/// Which columns the scatter summary plots.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryConfig {
    pub scatter_x: String,
    pub scatter_y: String,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            scatter_x: DEFAULT_SCATTER_X.to_string(),
            scatter_y: DEFAULT_SCATTER_Y.to_string(),
        }
    }
}

/// Rows per predicted label, most frequent first and ties by label.
pub fn outcome_distribution(result: &PredictionResult) -> Result<Vec<OutcomeCount>, SummaryError> {
    if result.is_empty() {
        return Err(SummaryError::NoPredictions);
    }
    let mut counts: AHashMap<&str, usize> = AHashMap::new();
    for label in result.labels() {
        *counts.entry(label.as_str()).or_insert(0) += 1;
    }
    let total = result.len() as f64;
    let mut distribution: Vec<OutcomeCount> = counts
        .into_iter()
        .map(|(label, count)| OutcomeCount {
            label: label.to_string(),
            count,
            share: count as f64 / total,
        })
        .collect();
    distribution.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    Ok(distribution)
}

/// Correlates every numeric column of the encoded upload: identifiers are
/// left out and categoricals enter as their 0/1 indicator columns.
///
/// A column is numeric when it has at least one number and no text. Each
/// pair uses the rows where both cells are present; pairs with fewer than
/// two such rows or no variance come out as NaN.
pub fn correlation_matrix(result: &PredictionResult) -> Result<CorrelationMatrix, SummaryError> {
    let table = result.features();
    let numeric: Vec<(String, Vec<Option<f64>>)> = table
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(idx, name)| {
            let cells: Vec<&RawValue> = table.column_values(idx).collect();
            let all_numeric = cells
                .iter()
                .all(|c| matches!(c, RawValue::Missing | RawValue::Number(_)));
            let any_number = cells.iter().any(|c| matches!(c, RawValue::Number(_)));
            (all_numeric && any_number).then(|| {
                let values = cells
                    .iter()
                    .map(|c| match c {
                        RawValue::Number(v) => Some(*v),
                        _ => None,
                    })
                    .collect();
                (name.clone(), values)
            })
        })
        .collect();

    if numeric.is_empty() {
        return Err(SummaryError::NoNumericColumns);
    }

    let k = numeric.len();
    let mut values = Array2::<f64>::from_elem((k, k), f64::NAN);
    for i in 0..k {
        for j in i..k {
            let r = pearson(&numeric[i].1, &numeric[j].1);
            values[[i, j]] = r;
            values[[j, i]] = r;
        }
    }

    Ok(CorrelationMatrix {
        columns: numeric.into_iter().map(|(name, _)| name).collect(),
        values,
    })
}

fn pearson(a: &[Option<f64>], b: &[Option<f64>]) -> f64 {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return f64::NAN;
    }
    (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0)
}

/// Points of two numeric columns, each tagged with its predicted label.
/// Rows where either value is not a number are left out.
pub fn labeled_scatter(
    result: &PredictionResult,
    x_column: &str,
    y_column: &str,
) -> Result<Vec<ScatterPoint>, SummaryError> {
    let table = result.table();
    let x_idx = table
        .column_index(x_column)
        .ok_or_else(|| SummaryError::MissingColumn(x_column.to_string()))?;
    let y_idx = table
        .column_index(y_column)
        .ok_or_else(|| SummaryError::MissingColumn(y_column.to_string()))?;

    Ok(result
        .rows()
        .filter_map(|(row, label)| {
            Some(ScatterPoint {
                x: row[x_idx].as_number()?,
                y: row[y_idx].as_number()?,
                label: label.to_string(),
            })
        })
        .collect())
}

/// All summaries for one result, each with its own outcome.
#[derive(Debug)]
pub struct Summaries {
    pub distribution: Result<Vec<OutcomeCount>, SummaryError>,
    pub correlation: Result<CorrelationMatrix, SummaryError>,
    pub scatter: Result<Vec<ScatterPoint>, SummaryError>,
}

impl Summaries {
    pub fn compute(result: &PredictionResult, config: &SummaryConfig) -> Self {
        let summaries = Self {
            distribution: outcome_distribution(result),
            correlation: correlation_matrix(result),
            scatter: labeled_scatter(result, &config.scatter_x, &config.scatter_y),
        };
        if let Err(e) = &summaries.scatter {
            log::warn!("Skipping scatter summary: {e}");
        }
        summaries
    }
}
