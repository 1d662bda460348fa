use crate::align::{AlignError, AlignedFeatureMatrix, AlignmentConfig, SchemaAligner};
use crate::data::{RawTable, RawValue};
use crate::model::{PredictionError, TrainedClassifier};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Column name under which predicted labels are shown.
pub const DEFAULT_LABEL_COLUMN: &str = "Predicted Outcome";

/// Any failure between receiving an upload and holding its predictions.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("The upload does not match the model's schema: {0}")]
    SchemaMismatch(#[from] AlignError),
    #[error("Prediction failed. Error: {0}")]
    Prediction(#[from] PredictionError),
}

/// The upload as the user sent it, with one predicted label per row.
#[derive(Debug, Clone)]
pub struct PredictionResult {
    table: RawTable,
    features: RawTable,
    labels: Vec<String>,
    label_column: String,
}

impl PredictionResult {
    /// The original rows, before identifiers were dropped or categories encoded.
    pub fn table(&self) -> &RawTable {
        &self.table
    }

    /// The upload as the model sees it before schema filtering: identifiers
    /// dropped and categoricals expanded to 0/1 indicator columns.
    pub fn features(&self) -> &RawTable {
        &self.features
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label_column(&self) -> &str {
        &self.label_column
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterates over `(original row, predicted label)` pairs.
    pub fn rows(&self) -> impl Iterator<Item = (&[RawValue], &str)> + '_ {
        self.table
            .rows()
            .iter()
            .zip(&self.labels)
            .map(|(row, label)| (row.as_slice(), label.as_str()))
    }

    /// Writes the annotated upload, original columns first and the label last.
    pub fn write_csv(&self, path: &Path) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;
        let mut header: Vec<&str> = self.table.columns().iter().map(String::as_str).collect();
        header.push(&self.label_column);
        writer.write_record(&header)?;
        for (row, label) in self.rows() {
            let mut record: Vec<String> = row.iter().map(|cell| cell.to_string()).collect();
            record.push(label.to_string());
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Runs uploads through alignment and the shared classifier.
#[derive(Debug)]
pub struct PredictionPipeline {
    model: Arc<TrainedClassifier>,
    aligner: SchemaAligner,
    label_column: String,
}

impl PredictionPipeline {
    pub fn new(model: Arc<TrainedClassifier>, config: AlignmentConfig) -> Self {
        let aligner =
            SchemaAligner::new(config).with_feature_defaults(model.feature_defaults().clone());
        Self {
            model,
            aligner,
            label_column: DEFAULT_LABEL_COLUMN.to_string(),
        }
    }

    pub fn with_label_column(mut self, label_column: impl Into<String>) -> Self {
        self.label_column = label_column.into();
        self
    }

    pub fn model(&self) -> &TrainedClassifier {
        &self.model
    }

    /// Aligns an upload against the model's schema without predicting.
    pub fn align(&self, table: &RawTable) -> Result<AlignedFeatureMatrix, PipelineError> {
        Ok(self.aligner.align(table, self.model.expected_columns())?)
    }

    /// Aligns, predicts, and attaches the labels to the original rows.
    ///
    /// An upload that already carries the label column (a re-uploaded export,
    /// say) has that column replaced by the new predictions.
    pub fn run(&self, table: &RawTable) -> Result<PredictionResult, PipelineError> {
        let table = if table.column_index(&self.label_column).is_some() {
            log::warn!(
                "Replacing the uploaded '{}' column with new predictions",
                self.label_column
            );
            table.without_column(&self.label_column)
        } else {
            table.clone()
        };
        let (matrix, features) = self
            .aligner
            .align_with_encoded(&table, self.model.expected_columns())?;
        log::info!(
            "Aligned {} rows to {} model features",
            matrix.nrows(),
            matrix.ncols()
        );
        let labels = self.model.predict(&matrix)?;
        debug_assert_eq!(labels.len(), table.height());
        log::info!("Predictions completed for {} rows", labels.len());
        Ok(PredictionResult {
            table,
            features,
            labels,
            label_column: self.label_column.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DecisionTree, Estimator, ModelArtifact, TreeNode};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn model() -> Arc<TrainedClassifier> {
        let artifact = ModelArtifact {
            feature_names: vec!["Channel_Used_TV".to_string(), "Engagement_Score".to_string()],
            classes: vec!["Failure".to_string(), "Success".to_string()],
            feature_defaults: BTreeMap::new(),
            estimator: Estimator::Forest {
                trees: vec![DecisionTree {
                    nodes: vec![
                        TreeNode::Split {
                            feature: 0,
                            threshold: 0.5,
                            left: 1,
                            right: 2,
                        },
                        TreeNode::Leaf {
                            weights: vec![1.0, 0.0],
                        },
                        TreeNode::Leaf {
                            weights: vec![0.0, 1.0],
                        },
                    ],
                }],
            },
        };
        Arc::new(TrainedClassifier::from_artifact(artifact).unwrap())
    }

    fn upload() -> RawTable {
        let text = |s: &str| RawValue::Text(s.to_string());
        RawTable::new(
            vec![
                "Campaign_ID".to_string(),
                "Campaign_Type".to_string(),
                "Channel_Used".to_string(),
                "Engagement_Score".to_string(),
            ],
            vec![
                vec![RawValue::Number(7.0), text("Email"), text("TV"), RawValue::Number(0.3)],
                vec![RawValue::Number(8.0), text("Social"), text("Radio"), RawValue::Number(0.9)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_labels_attach_to_original_rows() {
        let pipeline = PredictionPipeline::new(model(), AlignmentConfig::default());
        let result = pipeline.run(&upload()).unwrap();

        assert_eq!(result.labels(), &["Success", "Failure"]);
        assert_eq!(result.label_column(), DEFAULT_LABEL_COLUMN);
        // The user's own columns survive, identifiers and raw categories included.
        assert_eq!(result.table().columns()[0], "Campaign_ID");
        let (first_row, first_label) = result.rows().next().unwrap();
        assert_eq!(first_row[1], RawValue::Text("Email".to_string()));
        assert_eq!(first_label, "Success");
    }

    #[test]
    fn test_missing_categorical_stops_before_prediction() {
        let table = RawTable::new(
            vec!["Campaign_Type".to_string(), "Engagement_Score".to_string()],
            vec![vec![RawValue::Text("Email".to_string()), RawValue::Number(0.1)]],
        )
        .unwrap();
        let pipeline = PredictionPipeline::new(model(), AlignmentConfig::default());
        match pipeline.run(&table) {
            Err(PipelineError::SchemaMismatch(AlignError::MissingCategorical(col))) => {
                assert_eq!(col, "Channel_Used");
            }
            other => panic!("Expected SchemaMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_write_csv_appends_label_column() {
        let pipeline = PredictionPipeline::new(model(), AlignmentConfig::default())
            .with_label_column("Outcome");
        let result = pipeline.run(&upload()).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        result.write_csv(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Campaign_ID,Campaign_Type,Channel_Used,Engagement_Score,Outcome",
                "7,Email,TV,0.3,Success",
                "8,Social,Radio,0.9,Failure",
            ]
        );
    }

    #[test]
    fn test_existing_label_column_is_replaced() {
        let table = RawTable::new(
            vec![
                "Channel_Used".to_string(),
                "Engagement_Score".to_string(),
                DEFAULT_LABEL_COLUMN.to_string(),
            ],
            vec![
                vec![
                    RawValue::Text("TV".to_string()),
                    RawValue::Number(0.9),
                    RawValue::Text("Failure".to_string()),
                ],
                vec![
                    RawValue::Text("Radio".to_string()),
                    RawValue::Number(0.2),
                    RawValue::Text("Success".to_string()),
                ],
            ],
        )
        .unwrap();
        let config = AlignmentConfig {
            encoding: crate::align::CategoricalEncodingSpec::new(vec!["Channel_Used".to_string()]),
            ..AlignmentConfig::default()
        };
        let result = PredictionPipeline::new(model(), config).run(&table).unwrap();

        assert_eq!(result.table().columns(), &["Channel_Used", "Engagement_Score"]);
        assert!(result.features().column_index(DEFAULT_LABEL_COLUMN).is_none());
        assert_eq!(result.labels(), &["Success", "Failure"]);

        let dir = tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        result.write_csv(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written.lines().collect::<Vec<_>>(),
            vec![
                "Channel_Used,Engagement_Score,Predicted Outcome",
                "TV,0.9,Success",
                "Radio,0.2,Failure",
            ]
        );
    }

    #[test]
    fn test_features_hold_encoded_upload() {
        let result = PredictionPipeline::new(model(), AlignmentConfig::default())
            .run(&upload())
            .unwrap();
        assert_eq!(
            result.features().columns(),
            &["Campaign_Type_Social", "Channel_Used_TV", "Engagement_Score"]
        );
        assert_eq!(
            result.features().rows()[1],
            vec![RawValue::Number(1.0), RawValue::Number(0.0), RawValue::Number(0.9)]
        );
    }
}
