//! Model artifact serialization and persistence
//!
//! Artifacts are JSON documents `{ "format_version": N, "model": {...} }`.
//! Writes go to a temporary file in the target directory which is then
//! renamed over the destination, so readers never observe a partial file.

use crate::classifier::TrainedModel;
use crate::core::{ClassifierError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Artifact layout version written by this build
pub const FORMAT_VERSION: u32 = 1;

/// On-disk wrapper around a trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub model: TrainedModel,
}

impl ModelArtifact {
    pub fn new(model: TrainedModel) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            model,
        }
    }

    /// Save the artifact, atomically replacing any existing file at `path`
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp =
            NamedTempFile::new_in(dir).map_err(|e| ClassifierError::persistence(path, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, self)
                .map_err(|e| ClassifierError::persistence(path, e))?;
            writer
                .flush()
                .map_err(|e| ClassifierError::persistence(path, e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| ClassifierError::persistence(path, e))?;
        tmp.persist(path)
            .map_err(|e| ClassifierError::persistence(path, e.error))?;
        Ok(())
    }

    /// Load an artifact, rejecting unknown format versions and models that
    /// fail [`TrainedModel::verify`]
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ClassifierError::persistence(path, e))?;
        let artifact: ModelArtifact = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| ClassifierError::persistence(path, e))?;

        if artifact.format_version != FORMAT_VERSION {
            return Err(ClassifierError::persistence(
                path,
                format!(
                    "unsupported format version {} (expected {})",
                    artifact.format_version, FORMAT_VERSION
                ),
            ));
        }
        artifact
            .model
            .verify()
            .map_err(|e| ClassifierError::persistence(path, e))?;
        Ok(artifact)
    }
}

/// Persist a trained model to `path`
pub fn save_model<P: AsRef<Path>>(model: &TrainedModel, path: P) -> Result<()> {
    ModelArtifact::new(model.clone()).save_to_file(path)
}

/// Load a trained model from `path`
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<TrainedModel> {
    Ok(ModelArtifact::load_from_file(path)?.model)
}
