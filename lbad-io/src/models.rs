//! Model library storage
//!
//! A library is a JSON document of the form `{"models": [...]}`. A path may
//! name a single library file or a directory of `*.json` libraries, which are
//! merged in file-name order (a later label replaces an earlier one).

use lbad_core::{Error, Model, ModelSet, Result, FEATURE_NAMES};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk model library document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelLibrary {
    pub models: Vec<Model>,
}

/// Load every model stored at `path`.
///
/// Any failure (missing path, unreadable file, malformed JSON, invalid model)
/// is reported as [`Error::ModelLoad`].
pub fn load_models<P: AsRef<Path>>(path: P) -> Result<ModelSet> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(Error::model_load(path, "empty path"));
    }

    let metadata = fs::metadata(path).map_err(|e| Error::model_load(path, e))?;
    let files = if metadata.is_dir() {
        library_files(path)?
    } else {
        vec![path.to_path_buf()]
    };

    let mut models = Vec::new();
    for file in &files {
        let library = read_library(file)?;
        debug!(file = %file.display(), count = library.models.len(), "read model library");
        models.extend(library.models);
    }

    Ok(ModelSet::from_models(models))
}

/// Write `models` as a single library file
pub fn save_models<P: AsRef<Path>>(path: P, models: &ModelSet) -> Result<()> {
    let library = ModelLibrary {
        models: models.iter().cloned().collect(),
    };
    let json = serde_json::to_string_pretty(&library)
        .map_err(|e| Error::InvalidData(format!("Failed to encode models: {}", e)))?;
    fs::write(path, json)?;
    Ok(())
}

fn library_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::model_load(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::model_load(dir, e))?;
        let file = entry.path();
        if file.is_file() && file.extension().and_then(|s| s.to_str()) == Some("json") {
            files.push(file);
        }
    }
    if files.is_empty() {
        return Err(Error::model_load(dir, "directory contains no .json model libraries"));
    }
    files.sort();
    Ok(files)
}

fn read_library(file: &Path) -> Result<ModelLibrary> {
    let text = fs::read_to_string(file).map_err(|e| Error::model_load(file, e))?;
    let library: ModelLibrary =
        serde_json::from_str(&text).map_err(|e| Error::model_load(file, e))?;

    for model in &library.models {
        validate_model(model).map_err(|reason| Error::model_load(file, reason))?;
    }
    Ok(library)
}

fn validate_model(model: &Model) -> std::result::Result<(), String> {
    if model.label.trim().is_empty() {
        return Err("model with an empty label".to_string());
    }
    if !(model.threshold.is_finite() && model.threshold >= 0.0) {
        return Err(format!(
            "model '{}' has invalid threshold {}",
            model.label, model.threshold
        ));
    }
    // Density may legitimately be unbounded
    let finite_except_density = model
        .reference
        .features()
        .iter()
        .zip(FEATURE_NAMES)
        .all(|(f, name)| name == "density" || f.is_finite());
    if !finite_except_density {
        return Err(format!("model '{}' has non-finite features", model.label));
    }
    Ok(())
}
