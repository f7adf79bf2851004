//! Error types for formulary ingestion.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Structural failures that abort an ingestion call.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Caller-supplied input path does not exist.
    #[error("input not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Archive has no `*formulary*.csv` entry.
    #[error("no *formulary*.csv entry found inside {path}")]
    NoTableFound { path: PathBuf },

    /// Shared-secret mismatch at the admin boundary.
    #[error("unauthorized")]
    Unauthorized,

    #[error("failed to read archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to parse CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IngestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

/// Transient failure of a single remote lookup attempt. Retried, never
/// surfaced past the resolver.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}
