//! Where run artifacts are written.
//!
//! A [`LocationProvider`] supplies the registry root. Each run gets its own
//! `TestRun-<yyyyMMdd-HHmmss>` directory below it, holding the result
//! document and a `Screenshots` evidence directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::config::ENV_REGISTRY;
use crate::error::{Result, TrailError};

/// Name of the evidence sub-directory inside a run directory.
pub const EVIDENCE_DIR: &str = "Screenshots";
/// File name of the result document.
pub const RESULT_FILE: &str = "test-result.json";
/// File name of the result document's digest.
pub const DIGEST_FILE: &str = "test-result.digest";

/// Supplies the root directory for run artifacts.
pub trait LocationProvider: Send + Sync {
    fn registry_root(&self) -> Result<PathBuf>;
}

/// A fixed registry root.
#[derive(Debug, Clone)]
pub struct FixedLocation(pub PathBuf);

impl LocationProvider for FixedLocation {
    fn registry_root(&self) -> Result<PathBuf> {
        Ok(self.0.clone())
    }
}

/// `$CASETRAIL_REGISTRY`, falling back to a hidden directory in the working
/// directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvLocationProvider;

impl LocationProvider for EnvLocationProvider {
    fn registry_root(&self) -> Result<PathBuf> {
        match std::env::var(ENV_REGISTRY) {
            Ok(root) if !root.trim().is_empty() => Ok(PathBuf::from(root)),
            _ => Ok(std::env::current_dir()?.join(default_registry_dir_name())),
        }
    }
}

/// Windows does not hide dot-directories, so the dot is dropped there.
pub fn default_registry_dir_name() -> &'static str {
    if cfg!(windows) {
        "casetrail"
    } else {
        ".casetrail"
    }
}

/// `TestRun-<yyyyMMdd-HHmmss>` for the given local time.
pub fn run_directory_name(at: DateTime<Local>) -> String {
    format!("TestRun-{}", at.format("%Y%m%d-%H%M%S"))
}

/// Resolved on-disk layout of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    run_dir: PathBuf,
    evidence_dir: PathBuf,
}

impl RunLayout {
    /// Layout for an existing (or to-be-created) run directory.
    pub fn at(run_dir: impl Into<PathBuf>) -> Self {
        let run_dir = run_dir.into();
        let evidence_dir = run_dir.join(EVIDENCE_DIR);
        Self {
            run_dir,
            evidence_dir,
        }
    }

    /// Create `<root>/TestRun-<timestamp>/Screenshots`.
    ///
    /// The run directory is created exclusively. If another run already
    /// claimed the name (two runs started within the same second) the
    /// directory becomes `TestRun-<timestamp>-1`, `-2`, and so on.
    pub fn create(root: &Path, at: DateTime<Local>) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(|source| TrailError::RunDirectory {
            path: root.to_path_buf(),
            source,
        })?;

        let base = run_directory_name(at);
        let mut suffix = 0u32;
        let layout = loop {
            let name = match suffix {
                0 => base.clone(),
                n => format!("{base}-{n}"),
            };
            let layout = Self::at(root.join(name));
            match std::fs::create_dir(&layout.run_dir) {
                Ok(()) => break layout,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => suffix += 1,
                Err(source) => {
                    return Err(TrailError::RunDirectory {
                        path: layout.run_dir,
                        source,
                    })
                }
            }
        };

        std::fs::create_dir(&layout.evidence_dir).map_err(|source| {
            TrailError::RunDirectory {
                path: layout.evidence_dir.clone(),
                source,
            }
        })?;
        Ok(layout)
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn evidence_dir(&self) -> &Path {
        &self.evidence_dir
    }

    pub fn result_path(&self) -> PathBuf {
        self.run_dir.join(RESULT_FILE)
    }

    pub fn digest_path(&self) -> PathBuf {
        self.run_dir.join(DIGEST_FILE)
    }
}
