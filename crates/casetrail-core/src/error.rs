//! Error taxonomy for casetrail.

use std::path::PathBuf;

/// casetrail errors.
///
/// Only I/O and serialization failures are fatal to a run. The case-level
/// variants are returned by the registry and downgraded to diagnostics by the
/// correlator, which cannot control the order callbacks arrive in.
#[derive(Debug, thiserror::Error)]
pub enum TrailError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("case #{0} is sealed")]
    CaseSealed(usize),

    #[error("unknown case #{0}")]
    UnknownCase(usize),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("screenshot capture failed: {0}")]
    Capture(String),

    #[error("cannot create run directory {path}: {source}")]
    RunDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for casetrail operations.
pub type Result<T> = std::result::Result<T, TrailError>;
