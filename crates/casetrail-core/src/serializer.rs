//! Result document persistence and evidence relocation.
//!
//! [`ResultSerializer::persist`] moves every screenshot referenced by the run
//! into `<run_dir>/Screenshots/<case>-<sequence:05>.png`, rewrites the event
//! paths, and writes `<run_dir>/test-result.json` (pretty-printed, RFC 3339
//! timestamps) plus `<run_dir>/test-result.digest` holding the SHA-256 of
//! the document.
//!
//! A screenshot that cannot be moved is reported and left where it was; the
//! rest of the run is still written.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::domain::{Event, RunResult};
use crate::error::{Result, TrailError};
use crate::location::RunLayout;
use crate::metrics::METRICS;

/// Handle to a written result document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    /// Path of `test-result.json`.
    pub document: PathBuf,
    /// Path of `test-result.digest`.
    pub digest_path: PathBuf,
    /// SHA-256 hex digest of the document bytes.
    pub digest: String,
    pub evidence_dir: PathBuf,
    pub relocation: RelocationReport,
}

/// Outcome of one evidence relocation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationReport {
    /// Files moved into the evidence directory during this pass.
    pub relocated: usize,
    /// Paths that already pointed at their final location.
    pub already_relocated: usize,
    /// Files that could not be moved; their paths were left unchanged.
    pub failed: usize,
}

pub struct ResultSerializer {
    layout: RunLayout,
}

impl ResultSerializer {
    pub fn new(layout: RunLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    /// Relocate evidence, then write the document and its digest.
    pub fn persist(&self, run: &mut RunResult) -> Result<ArtifactHandle> {
        fs::create_dir_all(self.layout.evidence_dir())?;
        let relocation = self.relocate_evidence(run);

        let json = serde_json::to_vec_pretty(run)?;
        let digest = hex::encode(Sha256::digest(&json));

        let document = self.layout.result_path();
        let digest_path = self.layout.digest_path();
        write_atomic(&document, &json)?;
        write_atomic(&digest_path, digest.as_bytes())?;

        crate::obs::emit_result_persisted(&document, relocation.relocated, relocation.failed);
        Ok(ArtifactHandle {
            document,
            digest_path,
            digest,
            evidence_dir: self.layout.evidence_dir().to_path_buf(),
            relocation,
        })
    }

    /// Move screenshots into the evidence directory under deterministic
    /// names. Safe to run more than once over the same run.
    ///
    /// Every event gets its own target file. When two events would map to
    /// the same name (same-named cases, repeated sequence numbers) the later
    /// one is written as `<case>_<n>-<sequence:05>.png`. An existing file is
    /// never overwritten.
    pub fn relocate_evidence(&self, run: &mut RunResult) -> RelocationReport {
        let evidence_dir = self.layout.evidence_dir();
        let mut report = RelocationReport::default();

        let mut claimed: HashSet<PathBuf> = run
            .cases
            .iter()
            .flat_map(|case| case.events.iter())
            .filter_map(Event::evidence)
            .filter(|path| is_relocated(path, evidence_dir))
            .map(Path::to_path_buf)
            .collect();

        for case in &mut run.cases {
            for (position, event) in case.events.iter_mut().enumerate() {
                let Some(source) = event.evidence().map(Path::to_path_buf) else {
                    continue;
                };
                if is_relocated(&source, evidence_dir) {
                    report.already_relocated += 1;
                    continue;
                }

                let sequence = event
                    .screenshot_sequence_number
                    .unwrap_or(position as u32);
                let target = free_target(evidence_dir, &case.name, sequence, &claimed);

                match move_file(&source, &target) {
                    Ok(()) => {
                        claimed.insert(target.clone());
                        event.screenshot_path = Some(target);
                        report.relocated += 1;
                        METRICS.inc_screenshots_relocated();
                    }
                    Err(e) => {
                        crate::obs::emit_relocation_failed(&source, &e);
                        METRICS.inc_relocation_failures();
                        report.failed += 1;
                    }
                }
            }
        }
        report
    }
}

/// First name in the `<case>-<seq>`, `<case>_2-<seq>`, ... series that is
/// neither claimed in this pass nor present on disk.
fn free_target(
    evidence_dir: &Path,
    case_name: &str,
    sequence: u32,
    claimed: &HashSet<PathBuf>,
) -> PathBuf {
    let mut attempt = 1u32;
    loop {
        let name = if attempt == 1 {
            evidence_file_name(case_name, sequence)
        } else {
            evidence_file_name(&format!("{case_name}_{attempt}"), sequence)
        };
        let candidate = evidence_dir.join(name);
        if !claimed.contains(&candidate) && !candidate.exists() {
            return candidate;
        }
        attempt += 1;
    }
}

/// `<case>-<sequence:05>.png`, with the case name reduced to file-safe
/// characters.
pub fn evidence_file_name(case_name: &str, sequence: u32) -> String {
    let mut safe: String = case_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if safe.is_empty() {
        safe.push_str("case");
    }
    format!("{safe}-{sequence:05}.png")
}

/// True when `path` already sits in `evidence_dir` with a `-NNNNN.png` name.
fn is_relocated(path: &Path, evidence_dir: &Path) -> bool {
    if path.parent() != Some(evidence_dir) {
        return false;
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let Some(stem) = name.strip_suffix(".png") else {
        return false;
    };
    match stem.rsplit_once('-') {
        Some((_, digits)) => digits.len() >= 5 && digits.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Rename, falling back to copy + remove across filesystems. Refuses to
/// replace an existing `to`.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if to.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", to.display()),
        ));
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}

/// Write to a temp file in the same directory, then rename over `path`.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read `test-result.json` from a run directory.
///
/// When a `test-result.digest` file is present the document bytes are
/// checked against it and `TrailError::DigestMismatch` is returned on
/// disagreement.
pub fn read_result(run_dir: &Path) -> Result<RunResult> {
    let layout = RunLayout::at(run_dir);
    let json = fs::read(layout.result_path())?;

    match fs::read_to_string(layout.digest_path()) {
        Ok(expected) => {
            let expected = expected.trim().to_string();
            let actual = hex::encode(Sha256::digest(&json));
            if expected != actual {
                return Err(TrailError::DigestMismatch { expected, actual });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(TrailError::Io(e)),
    }

    Ok(serde_json::from_slice(&json)?)
}
