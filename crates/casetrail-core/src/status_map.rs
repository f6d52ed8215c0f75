//! Translation of framework result names into [`TestStatus`].
//!
//! Ships with the JUnit platform and TestNG names. Extra names can be loaded
//! from a JSON object file such as `{"BROKEN": "FAILED"}`.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::TrailConfig;
use crate::domain::TestStatus;
use crate::error::{Result, TrailError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusMapper {
    /// Keys are stored upper-cased.
    mappings: BTreeMap<String, TestStatus>,
}

impl StatusMapper {
    /// A mapper with no names at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// JUnit platform (`SUCCESSFUL`, `FAILED`, `ABORTED`) and TestNG
    /// (`SUCCESS`, `FAILURE`, `SKIP`) result names.
    pub fn with_defaults() -> Self {
        let mut mapper = Self::new();
        for (name, status) in [
            ("SUCCESSFUL", TestStatus::Passed),
            ("FAILED", TestStatus::Failed),
            ("ABORTED", TestStatus::Skipped),
            ("SUCCESS", TestStatus::Passed),
            ("FAILURE", TestStatus::Failed),
            ("SKIP", TestStatus::Skipped),
            ("PASSED", TestStatus::Passed),
            ("SKIPPED", TestStatus::Skipped),
        ] {
            mapper.insert(name, status);
        }
        mapper
    }

    /// Defaults plus the mapping file named in `config`, if any.
    pub fn from_config(config: &TrailConfig) -> Result<Self> {
        let mut mapper = Self::with_defaults();
        if let Some(path) = &config.status_mapping {
            mapper.extend_from_file(path)?;
        }
        Ok(mapper)
    }

    pub fn insert(&mut self, name: &str, status: TestStatus) {
        self.mappings.insert(name.trim().to_ascii_uppercase(), status);
    }

    /// Status for a framework result name, ignoring case.
    pub fn map(&self, name: &str) -> Option<TestStatus> {
        self.mappings
            .get(&name.trim().to_ascii_uppercase())
            .copied()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Merge names from a JSON file. A missing file is not an error.
    pub fn extend_from_file(&mut self, path: &Path) -> Result<()> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no status mapping file");
                return Ok(());
            }
            Err(e) => return Err(TrailError::Io(e)),
        };
        let raw: BTreeMap<String, String> = serde_json::from_str(&text)?;
        for (name, value) in raw {
            let status = value
                .parse::<TestStatus>()
                .map_err(|e| TrailError::Config(format!("{}: {e}", path.display())))?;
            self.insert(&name, status);
        }
        Ok(())
    }

    /// Write all mappings as a JSON object.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.mappings)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_both_frameworks() {
        let mapper = StatusMapper::with_defaults();
        assert_eq!(mapper.map("SUCCESSFUL"), Some(TestStatus::Passed));
        assert_eq!(mapper.map("aborted"), Some(TestStatus::Skipped));
        assert_eq!(mapper.map("FAILURE"), Some(TestStatus::Failed));
        assert_eq!(mapper.map("Skip"), Some(TestStatus::Skipped));
        assert_eq!(mapper.map("SUCCESS_PERCENTAGE_FAILURE"), None);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");

        let mut mapper = StatusMapper::new();
        mapper.insert("broken", TestStatus::Failed);
        mapper.write(&path).unwrap();

        let mut loaded = StatusMapper::new();
        loaded.extend_from_file(&path).unwrap();
        assert_eq!(loaded, mapper);
        assert_eq!(loaded.map("BROKEN"), Some(TestStatus::Failed));
    }

    #[test]
    fn test_missing_file_keeps_defaults() {
        let config = TrailConfig {
            status_mapping: Some("/definitely/not/here.json".into()),
            ..Default::default()
        };
        let mapper = StatusMapper::from_config(&config).unwrap();
        assert_eq!(mapper, StatusMapper::with_defaults());
    }

    #[test]
    fn test_bad_status_value_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        std::fs::write(&path, r#"{"BROKEN": "EXPLODED"}"#).unwrap();

        let err = StatusMapper::new().extend_from_file(&path).unwrap_err();
        assert!(matches!(err, TrailError::Config(_)));
    }
}
