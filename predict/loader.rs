use crate::model::{ModelLoadError, TrainedClassifier};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Loads a classifier at most once and hands out shared handles to it.
///
/// Concurrent callers of [`ModelLoader::get`] serialize on an internal mutex,
/// so the artifact is read from disk a single time no matter how many
/// sessions ask for it. A failed load leaves the slot empty and is reported to
/// the caller that triggered it.
#[derive(Debug)]
pub struct ModelLoader {
    path: PathBuf,
    slot: Mutex<Option<Arc<TrainedClassifier>>>,
}

impl ModelLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            slot: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the shared classifier, loading it on first use.
    pub fn get(&self) -> Result<Arc<TrainedClassifier>, ModelLoadError> {
        let mut slot = self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }

        log::info!("Loading model from '{}'", self.path.display());
        let model = Arc::new(TrainedClassifier::load(&self.path)?);
        log::info!(
            "Model expects {} feature columns and predicts {} classes",
            model.expected_columns().len(),
            model.classes().len()
        );
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Whether a classifier has already been loaded.
    pub fn is_loaded(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or_else(|poisoned| poisoned.into_inner().is_some())
    }
}
