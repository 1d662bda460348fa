use crate::align::AlignedFeatureMatrix;
use ahash::AHashSet;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

// --- Public Data Structures ---
// These structs define the public, human-readable format of the pretrained
// classifier when serialized to a TOML file.

/// One node of a decision tree, stored in a flat array.
/// Children always sit at a larger index than their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TreeNode {
    /// Rows with `x[feature] <= threshold` continue at `left`, the rest at `right`.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Per-class weights (counts or probabilities) of the training rows that ended here.
    Leaf { weights: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

/// The fitted estimator inside the artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Estimator {
    /// One coefficient row per class, scored by argmax. A single row with two
    /// classes is a logistic model that picks the second class when the
    /// linear predictor is positive.
    Linear {
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    },
    /// An ensemble of trees whose normalized leaf weights are averaged.
    Forest { trees: Vec<DecisionTree> },
}

/// The top-level, self-contained model artifact.
/// This is the structure that gets saved to and loaded from a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Feature columns in the exact order the model was trained on.
    pub feature_names: Vec<String>,
    /// Class labels, indexed by the estimator's class positions.
    pub classes: Vec<String>,
    /// Optional per-feature fill values, typically training means.
    #[serde(default)]
    pub feature_defaults: BTreeMap<String, f64>,
    pub estimator: Estimator,
}

/// The ordered list of columns a model expects. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    columns: Vec<String>,
}

impl FeatureSchema {
    /// Builds a schema, rejecting empty or duplicated column lists.
    pub fn new(columns: Vec<String>) -> Result<Self, ModelLoadError> {
        if columns.is_empty() {
            return Err(ModelLoadError::InvalidArtifact(
                "the feature column list is empty".to_string(),
            ));
        }
        let mut seen = AHashSet::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(ModelLoadError::InvalidArtifact(format!(
                    "feature column '{name}' is listed twice"
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

/// Errors raised while loading or saving a model artifact.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("Failed to read or write model file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML model file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("The model artifact is invalid: {0}")]
    InvalidArtifact(String),
}

/// Errors raised by the model call itself.
#[derive(Error, Debug)]
pub enum PredictionError {
    #[error(
        "Feature matrix columns do not match the model. Expected {expected:?}, found {found:?}."
    )]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("Non-finite value found in feature '{column}' at row {row}.")]
    NonFiniteFeature { column: String, row: usize },
}

/// Dense form of the estimator, prepared once at load time.
#[derive(Debug)]
enum FittedEstimator {
    Logistic {
        coefficients: Array1<f64>,
        intercept: f64,
    },
    Multiclass {
        coefficients: Array2<f64>,
        intercepts: Array1<f64>,
    },
    Forest {
        trees: Vec<DecisionTree>,
    },
}

/// A loaded, validated classifier ready for prediction.
#[derive(Debug)]
pub struct TrainedClassifier {
    schema: FeatureSchema,
    classes: Vec<String>,
    feature_defaults: BTreeMap<String, f64>,
    estimator: FittedEstimator,
    artifact: ModelArtifact,
}

impl TrainedClassifier {
    /// Validates an artifact and prepares it for prediction.
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ModelLoadError> {
        let schema = FeatureSchema::new(artifact.feature_names.clone())?;
        internal::validate_classes(&artifact.classes)?;
        let estimator =
            internal::fit_estimator(&artifact.estimator, schema.len(), artifact.classes.len())?;
        Ok(Self {
            schema,
            classes: artifact.classes.clone(),
            feature_defaults: artifact.feature_defaults.clone(),
            estimator,
            artifact,
        })
    }

    /// Loads a pretrained classifier from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let toml_string = fs::read_to_string(path)?;
        let artifact: ModelArtifact = toml::from_str(&toml_string)?;
        Self::from_artifact(artifact)
    }

    /// Saves the classifier to a file in a human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ModelLoadError> {
        let toml_string = toml::to_string_pretty(&self.artifact)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn expected_columns(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn feature_defaults(&self) -> &BTreeMap<String, f64> {
        &self.feature_defaults
    }

    /// Predicts one label per row of an aligned feature matrix.
    ///
    /// The matrix must carry exactly the expected columns in the expected
    /// order; anything else is refused rather than silently reinterpreted.
    pub fn predict(&self, matrix: &AlignedFeatureMatrix) -> Result<Vec<String>, PredictionError> {
        // --- 1. Validate Inputs ---
        if matrix.columns() != self.schema.columns() {
            return Err(PredictionError::SchemaMismatch {
                expected: self.schema.columns().to_vec(),
                found: matrix.columns().to_vec(),
            });
        }
        let values = matrix.values();
        for (row, features) in values.outer_iter().enumerate() {
            if let Some(col) = features.iter().position(|v| !v.is_finite()) {
                return Err(PredictionError::NonFiniteFeature {
                    column: self.schema.columns()[col].clone(),
                    row: row + 1,
                });
            }
        }

        // --- 2. Score Each Row ---
        let class_indices: Vec<usize> = match &self.estimator {
            FittedEstimator::Logistic {
                coefficients,
                intercept,
            } => {
                let eta = values.dot(coefficients) + *intercept;
                eta.iter().map(|&e| usize::from(e > 0.0)).collect()
            }
            FittedEstimator::Multiclass {
                coefficients,
                intercepts,
            } => {
                let scores = values.dot(&coefficients.t()) + intercepts;
                scores.outer_iter().map(internal::argmax).collect()
            }
            FittedEstimator::Forest { trees } => values
                .outer_iter()
                .map(|features| {
                    let probabilities =
                        internal::forest_probabilities(trees, features, self.classes.len());
                    internal::argmax(probabilities.view())
                })
                .collect(),
        };

        Ok(class_indices
            .into_iter()
            .map(|idx| self.classes[idx].clone())
            .collect())
    }
}

/// Internal module for validation and scoring details.
mod internal {
    use super::*;

    pub(super) fn validate_classes(classes: &[String]) -> Result<(), ModelLoadError> {
        if classes.is_empty() {
            return Err(ModelLoadError::InvalidArtifact(
                "the class list is empty".to_string(),
            ));
        }
        let unique: AHashSet<&str> = classes.iter().map(String::as_str).collect();
        if unique.len() != classes.len() {
            return Err(ModelLoadError::InvalidArtifact(
                "the class list contains duplicates".to_string(),
            ));
        }
        Ok(())
    }

    pub(super) fn fit_estimator(
        estimator: &Estimator,
        n_features: usize,
        n_classes: usize,
    ) -> Result<FittedEstimator, ModelLoadError> {
        match estimator {
            Estimator::Linear {
                coefficients,
                intercepts,
            } => fit_linear(coefficients, intercepts, n_features, n_classes),
            Estimator::Forest { trees } => {
                if trees.is_empty() {
                    return Err(ModelLoadError::InvalidArtifact(
                        "the forest contains no trees".to_string(),
                    ));
                }
                for (i, tree) in trees.iter().enumerate() {
                    validate_tree(tree, i, n_features, n_classes)?;
                }
                Ok(FittedEstimator::Forest {
                    trees: trees.clone(),
                })
            }
        }
    }

    fn fit_linear(
        coefficients: &[Vec<f64>],
        intercepts: &[f64],
        n_features: usize,
        n_classes: usize,
    ) -> Result<FittedEstimator, ModelLoadError> {
        let rows = coefficients.len();
        let logistic = rows == 1 && n_classes == 2;
        if !logistic && rows != n_classes {
            return Err(ModelLoadError::InvalidArtifact(format!(
                "linear model has {rows} coefficient rows for {n_classes} classes"
            )));
        }
        if intercepts.len() != rows {
            return Err(ModelLoadError::InvalidArtifact(format!(
                "linear model has {} intercepts for {rows} coefficient rows",
                intercepts.len()
            )));
        }
        if let Some(bad) = coefficients.iter().find(|row| row.len() != n_features) {
            return Err(ModelLoadError::InvalidArtifact(format!(
                "coefficient row has {} entries, but the model has {n_features} features",
                bad.len()
            )));
        }

        if logistic {
            return Ok(FittedEstimator::Logistic {
                coefficients: Array1::from_vec(coefficients[0].clone()),
                intercept: intercepts[0],
            });
        }

        let flat: Vec<f64> = coefficients.iter().flatten().copied().collect();
        let coefficients = Array2::from_shape_vec((rows, n_features), flat).map_err(|e| {
            ModelLoadError::InvalidArtifact(format!("coefficient matrix is malformed: {e}"))
        })?;
        Ok(FittedEstimator::Multiclass {
            coefficients,
            intercepts: Array1::from_vec(intercepts.to_vec()),
        })
    }

    fn validate_tree(
        tree: &DecisionTree,
        tree_index: usize,
        n_features: usize,
        n_classes: usize,
    ) -> Result<(), ModelLoadError> {
        let invalid = |detail: String| {
            ModelLoadError::InvalidArtifact(format!("tree {tree_index}: {detail}"))
        };
        if tree.nodes.is_empty() {
            return Err(invalid("has no nodes".to_string()));
        }
        for (idx, node) in tree.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(invalid(format!(
                            "node {idx} splits on feature {feature}, but the model has {n_features} features"
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(invalid(format!("node {idx} has a non-finite threshold")));
                    }
                    for child in [*left, *right] {
                        if child <= idx || child >= tree.nodes.len() {
                            return Err(invalid(format!(
                                "node {idx} points to invalid child {child}"
                            )));
                        }
                    }
                }
                TreeNode::Leaf { weights } => {
                    if weights.len() != n_classes {
                        return Err(invalid(format!(
                            "leaf {idx} has {} class weights for {n_classes} classes",
                            weights.len()
                        )));
                    }
                    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                        return Err(invalid(format!(
                            "leaf {idx} has a negative or non-finite weight"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Walks one tree and returns the normalized class distribution of the leaf reached.
    fn tree_probabilities(
        tree: &DecisionTree,
        features: ArrayView1<f64>,
        n_classes: usize,
    ) -> Array1<f64> {
        let mut idx = 0;
        loop {
            match &tree.nodes[idx] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                TreeNode::Leaf { weights } => {
                    let total: f64 = weights.iter().sum();
                    return if total > 0.0 {
                        Array1::from_iter(weights.iter().map(|w| w / total))
                    } else {
                        Array1::zeros(n_classes)
                    };
                }
            }
        }
    }

    pub(super) fn forest_probabilities(
        trees: &[DecisionTree],
        features: ArrayView1<f64>,
        n_classes: usize,
    ) -> Array1<f64> {
        let mut total = Array1::<f64>::zeros(n_classes);
        for tree in trees {
            total += &tree_probabilities(tree, features, n_classes);
        }
        total / trees.len() as f64
    }

    /// Index of the largest score; ties go to the lowest index.
    pub(super) fn argmax(scores: ArrayView1<f64>) -> usize {
        let mut best = 0;
        for (idx, &score) in scores.iter().enumerate() {
            if score > scores[best] {
                best = idx;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{AlignmentConfig, CategoricalEncodingSpec, SchemaAligner};
    use crate::data::{RawTable, RawValue};
    use tempfile::tempdir;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// A single stump: Engagement_Score <= 0.5 → Failure, otherwise Success.
    fn stump_artifact() -> ModelArtifact {
        ModelArtifact {
            feature_names: names(&["Sentiment_Polarity", "Engagement_Score"]),
            classes: names(&["Failure", "Success"]),
            feature_defaults: BTreeMap::new(),
            estimator: Estimator::Forest {
                trees: vec![DecisionTree {
                    nodes: vec![
                        TreeNode::Split {
                            feature: 1,
                            threshold: 0.5,
                            left: 1,
                            right: 2,
                        },
                        TreeNode::Leaf {
                            weights: vec![8.0, 2.0],
                        },
                        TreeNode::Leaf {
                            weights: vec![1.0, 9.0],
                        },
                    ],
                }],
            },
        }
    }

    fn matrix_for(model: &TrainedClassifier, rows: Vec<Vec<f64>>) -> AlignedFeatureMatrix {
        let columns = model.expected_columns().columns().to_vec();
        let table = RawTable::new(
            columns,
            rows.into_iter()
                .map(|r| r.into_iter().map(RawValue::Number).collect())
                .collect(),
        )
        .unwrap();
        let config = AlignmentConfig {
            identifier_columns: vec![],
            encoding: CategoricalEncodingSpec::new(vec![]),
            ..AlignmentConfig::default()
        };
        SchemaAligner::new(config)
            .align(&table, model.expected_columns())
            .unwrap()
    }

    #[test]
    fn test_forest_prediction_follows_splits() {
        let model = TrainedClassifier::from_artifact(stump_artifact()).unwrap();
        let matrix = matrix_for(&model, vec![vec![0.1, 0.2], vec![0.1, 0.9], vec![0.0, 0.5]]);
        let labels = model.predict(&matrix).unwrap();
        assert_eq!(labels, names(&["Failure", "Success", "Failure"]));
    }

    #[test]
    fn test_forest_averages_trees() {
        let mut artifact = stump_artifact();
        // Second tree always votes strongly for Success.
        if let Estimator::Forest { trees } = &mut artifact.estimator {
            trees.push(DecisionTree {
                nodes: vec![TreeNode::Leaf {
                    weights: vec![0.0, 1.0],
                }],
            });
        }
        let model = TrainedClassifier::from_artifact(artifact).unwrap();
        // Tree 1 gives [0.8, 0.2]; tree 2 gives [0, 1]; mean is [0.4, 0.6].
        let matrix = matrix_for(&model, vec![vec![0.0, 0.1]]);
        assert_eq!(model.predict(&matrix).unwrap(), names(&["Success"]));
    }

    #[test]
    fn test_logistic_prediction() {
        let artifact = ModelArtifact {
            feature_names: names(&["x1", "x2"]),
            classes: names(&["No", "Yes"]),
            feature_defaults: BTreeMap::new(),
            estimator: Estimator::Linear {
                coefficients: vec![vec![2.0, -1.0]],
                intercepts: vec![-0.5],
            },
        };
        let model = TrainedClassifier::from_artifact(artifact).unwrap();
        // eta = 2*1 - 1*1 - 0.5 = 0.5 → Yes; eta = 0 - 0 - 0.5 → No.
        let matrix = matrix_for(&model, vec![vec![1.0, 1.0], vec![0.0, 0.0]]);
        assert_eq!(model.predict(&matrix).unwrap(), names(&["Yes", "No"]));
    }

    #[test]
    fn test_multiclass_argmax_with_ties() {
        let artifact = ModelArtifact {
            feature_names: names(&["x"]),
            classes: names(&["Low", "Mid", "High"]),
            feature_defaults: BTreeMap::new(),
            estimator: Estimator::Linear {
                coefficients: vec![vec![-1.0], vec![0.0], vec![1.0]],
                intercepts: vec![0.0, 0.0, 0.0],
            },
        };
        let model = TrainedClassifier::from_artifact(artifact).unwrap();
        let matrix = matrix_for(&model, vec![vec![-2.0], vec![3.0], vec![0.0]]);
        // At x = 0 all scores tie and the first class wins.
        assert_eq!(model.predict(&matrix).unwrap(), names(&["Low", "High", "Low"]));
    }

    #[test]
    fn test_predict_rejects_foreign_matrix() {
        let model = TrainedClassifier::from_artifact(stump_artifact()).unwrap();
        let other = TrainedClassifier::from_artifact(ModelArtifact {
            feature_names: names(&["Engagement_Score", "Sentiment_Polarity"]),
            ..stump_artifact()
        })
        .unwrap();
        let matrix = matrix_for(&other, vec![vec![0.1, 0.2]]);
        match model.predict(&matrix) {
            Err(PredictionError::SchemaMismatch { expected, found }) => {
                assert_eq!(expected, names(&["Sentiment_Polarity", "Engagement_Score"]));
                assert_eq!(found, names(&["Engagement_Score", "Sentiment_Polarity"]));
            }
            other => panic!("Expected SchemaMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_predict_rejects_non_finite_values() {
        let model = TrainedClassifier::from_artifact(stump_artifact()).unwrap();
        let matrix = matrix_for(&model, vec![vec![0.1, 0.2], vec![f64::NAN, 0.3]]);
        match model.predict(&matrix) {
            Err(PredictionError::NonFiniteFeature { column, row }) => {
                assert_eq!(column, "Sentiment_Polarity");
                assert_eq!(row, 2);
            }
            other => panic!("Expected NonFiniteFeature, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_artifacts_rejected() {
        let mut bad_child = stump_artifact();
        if let Estimator::Forest { trees } = &mut bad_child.estimator {
            trees[0].nodes[0] = TreeNode::Split {
                feature: 0,
                threshold: 0.0,
                left: 0,
                right: 2,
            };
        }
        let mut bad_feature = stump_artifact();
        if let Estimator::Forest { trees } = &mut bad_feature.estimator {
            trees[0].nodes[0] = TreeNode::Split {
                feature: 7,
                threshold: 0.0,
                left: 1,
                right: 2,
            };
        }
        let duplicate_columns = ModelArtifact {
            feature_names: names(&["a", "a"]),
            ..stump_artifact()
        };
        let wrong_rows = ModelArtifact {
            feature_names: names(&["a"]),
            classes: names(&["x", "y", "z"]),
            feature_defaults: BTreeMap::new(),
            estimator: Estimator::Linear {
                coefficients: vec![vec![1.0]],
                intercepts: vec![0.0],
            },
        };

        for artifact in [bad_child, bad_feature, duplicate_columns, wrong_rows] {
            let err = TrainedClassifier::from_artifact(artifact).unwrap_err();
            assert!(
                matches!(err, ModelLoadError::InvalidArtifact(_)),
                "Expected InvalidArtifact, got {err:?}"
            );
        }
    }

    /// Tests that the model can be saved to and loaded from a file,
    /// preserving all its contents exactly.
    #[test]
    fn test_save_load_functionality() {
        let mut artifact = stump_artifact();
        artifact
            .feature_defaults
            .insert("Engagement_Score".to_string(), 0.42);
        let original = TrainedClassifier::from_artifact(artifact.clone()).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("model.toml");
        original.save(&path).unwrap();
        let loaded = TrainedClassifier::load(&path).unwrap();

        assert_eq!(loaded.artifact, artifact);
        assert_eq!(loaded.expected_columns(), original.expected_columns());
        assert_eq!(loaded.classes(), original.classes());
        assert_eq!(loaded.feature_defaults().get("Engagement_Score"), Some(&0.42));
    }

    #[test]
    fn test_load_missing_and_corrupt_files() {
        let dir = tempdir().unwrap();
        let missing = TrainedClassifier::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, ModelLoadError::IoError(_)));

        let corrupt_path = dir.path().join("corrupt.toml");
        fs::write(&corrupt_path, "feature_names = [1, 2").unwrap();
        let corrupt = TrainedClassifier::load(&corrupt_path).unwrap_err();
        assert!(matches!(corrupt, ModelLoadError::TomlParseError(_)));
    }
}
