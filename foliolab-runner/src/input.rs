//! Input loading — JSON and CSV files into classified engine inputs.
//!
//! Every loader validates through `foliolab_core::classify`, so nothing
//! unchecked reaches the engine.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use foliolab_core::classify::{classify_all, classify_operations, RawOperation, RawPosition};
use foliolab_core::domain::{Operation, PositionSet, TargetAllocation};
use foliolab_core::scenario::ScenarioChange;
use foliolab_core::ValidationError;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("parse CSV in '{path}': {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("invalid record in '{path}': {source}")]
    Invalid {
        path: PathBuf,
        source: ValidationError,
    },
}

/// Operation file formats, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationsFormat {
    Json,
    Csv,
}

impl OperationsFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Csv,
            _ => Self::Json,
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a JSON array of broker positions and classify them.
pub fn load_positions(path: &Path) -> Result<PositionSet, LoadError> {
    let raws: Vec<RawPosition> = read_json(path)?;
    let positions = classify_all(&raws).map_err(|source| LoadError::Invalid {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), positions = positions.len(), "positions loaded");
    Ok(positions)
}

/// Load a target allocation. Weight validation happens in the engine.
pub fn load_target(path: &Path) -> Result<TargetAllocation, LoadError> {
    read_json(path)
}

/// Load a JSON array of tagged scenario changes.
pub fn load_changes(path: &Path) -> Result<Vec<ScenarioChange>, LoadError> {
    read_json(path)
}

/// Load operations from JSON, or from CSV with header
/// `instrument_id,side,date,quantity,price`.
pub fn load_operations(path: &Path) -> Result<Vec<Operation>, LoadError> {
    let raws = match OperationsFormat::from_path(path) {
        OperationsFormat::Json => read_json::<Vec<RawOperation>>(path)?,
        OperationsFormat::Csv => read_operations_csv(path)?,
    };
    let operations = classify_operations(&raws).map_err(|source| LoadError::Invalid {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), operations = operations.len(), "operations loaded");
    Ok(operations)
}

fn read_operations_csv(path: &Path) -> Result<Vec<RawOperation>, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
    reader
        .deserialize::<RawOperation>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })
}
