use crate::structs::DatasetKind;
use arrow_schema::ArrowError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Load Error: {}: {reason}", .path.display())]
    Load { path: PathBuf, reason: String },
    #[error("Validation Error: {dataset}: {reason}")]
    Validation { dataset: DatasetKind, reason: String },
    #[error("Write Error: {}: {reason}", .path.display())]
    Write { path: PathBuf, reason: String },
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parquet Error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("Arrow Error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Classifies any stage failure as a load failure for `path`.
    pub fn into_load(self, path: impl Into<PathBuf>) -> Self {
        match self {
            err @ (Self::Load { .. } | Self::Validation { .. }) => err,
            other => Self::Load {
                path: path.into(),
                reason: other.to_string(),
            },
        }
    }

    /// Classifies any stage failure as a write failure for `path`.
    pub fn into_write(self, path: impl Into<PathBuf>) -> Self {
        match self {
            err @ Self::Write { .. } => err,
            other => Self::Write {
                path: path.into(),
                reason: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
