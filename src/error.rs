// Error taxonomy for the pipeline
//
// Only conditions that abort a stage are errors. Row-level parse failures
// and unmapped identifiers are recovered in place and surface as counters
// in the RunSummary instead.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    /// Missing or invalid configuration. Fatal, raised before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A source file could not be read. Recovered per-file by the
    /// extractor (file skipped, run continues); fatal only when the
    /// caller asked for that exact file.
    #[error("failed to read source file {path}: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A source file or staging artifact exists but does not have the
    /// expected shape (missing column, unknown action tag). Fatal for
    /// that file; the run's policy decides whether to skip it.
    #[error("malformed data in {path}: {detail}")]
    Malformed { path: PathBuf, detail: String },

    /// Storage read/write failure. Fatal for the stage it occurs in;
    /// prior stages' staging artifacts remain valid.
    #[error("storage operation failed: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Staging artifact could not be written or re-read.
    #[error("staging artifact error: {0}")]
    Staging(#[from] csv::Error),

    /// Run report could not be serialized.
    #[error("report serialization failed: {0}")]
    Report(#[from] serde_json::Error),

    /// Filesystem error around staging/log artifacts.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EtlError>;
