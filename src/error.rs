//! Top-level error type for a comparison run.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::diff::DiffError;
use crate::snapshot::SnapshotError;

/// Errors surfaced by the route orchestrator and the CLI
#[derive(Error, Debug)]
pub enum CompareError {
    #[error("capture failed: {0}")]
    Capture(#[from] SnapshotError),

    #[error("diff failed: {0}")]
    Diff(#[from] DiffError),

    #[error("archive write failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("route '{route}' failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        route: String,
        attempts: u32,
        #[source]
        source: Box<CompareError>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("diff worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CompareError {
    /// Whether the failure happened while writing the archive
    pub fn is_write_failure(&self) -> bool {
        matches!(self, CompareError::Archive(_))
    }
}

pub type CompareResult<T> = Result<T, CompareError>;
