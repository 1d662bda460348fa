//! Deployment configuration.
//!
//! Settings come from an optional TOML file. The model path can additionally
//! be supplied through the `CAMPAIGN_MODEL_PATH` environment variable or on
//! the command line; the most specific source wins.

use crate::align::{AlignmentConfig, CategoricalEncodingSpec, ImputationPolicy};
use crate::pipeline::DEFAULT_LABEL_COLUMN;
use crate::summary::{DEFAULT_SCATTER_X, DEFAULT_SCATTER_Y, SummaryConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that overrides `model_path` from the config file.
pub const MODEL_PATH_ENV: &str = "CAMPAIGN_MODEL_PATH";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML config file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error(
        "No model file configured. Pass --model, set CAMPAIGN_MODEL_PATH, or add model_path to the config file."
    )]
    ModelPathMissing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub model_path: Option<PathBuf>,
    pub identifier_columns: Vec<String>,
    pub categorical_columns: CategoricalEncodingSpec,
    pub imputation: ImputationPolicy,
    pub label_column: String,
    pub scatter_x: String,
    pub scatter_y: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let alignment = AlignmentConfig::default();
        Self {
            model_path: None,
            identifier_columns: alignment.identifier_columns,
            categorical_columns: alignment.encoding,
            imputation: alignment.imputation,
            label_column: DEFAULT_LABEL_COLUMN.to_string(),
            scatter_x: DEFAULT_SCATTER_X.to_string(),
            scatter_y: DEFAULT_SCATTER_Y.to_string(),
        }
    }
}

impl AppConfig {
    /// Reads a config file, or returns the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                log::info!("Loading configuration from '{}'", path.display());
                Self::from_toml(&fs::read_to_string(path)?)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Picks the model path: command line first, then the environment, then the file.
    pub fn resolve_model_path(
        &self,
        cli_path: Option<PathBuf>,
        env_path: Option<String>,
    ) -> Result<PathBuf, ConfigError> {
        cli_path
            .or_else(|| env_path.filter(|p| !p.trim().is_empty()).map(PathBuf::from))
            .or_else(|| self.model_path.clone())
            .ok_or(ConfigError::ModelPathMissing)
    }

    pub fn alignment(&self) -> AlignmentConfig {
        AlignmentConfig {
            identifier_columns: self.identifier_columns.clone(),
            encoding: self.categorical_columns.clone(),
            imputation: self.imputation,
        }
    }

    pub fn summary(&self) -> SummaryConfig {
        SummaryConfig {
            scatter_x: self.scatter_x.clone(),
            scatter_y: self.scatter_y.clone(),
        }
    }
}
