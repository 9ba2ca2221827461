use std::path::PathBuf;

use thiserror::Error;

use crate::engine::DrawPhase;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DrawError {
    #[error("invalid draw state: {0}")]
    InvalidDrawState(String),
    /// Advisory: nothing was committed, the caller may retry with an override.
    #[error("quota exceeded for `{category}`: {current} won + {pending} pending > quota {quota}")]
    QuotaExceeded {
        category: String,
        current: usize,
        pending: usize,
        quota: usize,
    },
}

impl DrawError {
    pub(crate) fn wrong_phase(op: &str, phase: DrawPhase) -> Self {
        DrawError::InvalidDrawState(format!("cannot {op} while {phase:?}"))
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{file}: {reason}")]
    Malformed { file: String, reason: String },
    #[error("{file}: reward id `{id}` already used by another category")]
    DuplicateId { file: String, id: String },
    #[error("invalid band format character `{0}`")]
    BandFormat(char),
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("result file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing required resources: {}", join_paths(.0))]
    MissingResources(Vec<PathBuf>),
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type DrawResult<T> = Result<T, DrawError>;
