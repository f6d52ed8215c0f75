//! Runtime configuration.
//!
//! Values come from a TOML file, from `CASETRAIL_*` environment variables,
//! or both (environment wins). Every field is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrailError};
use crate::location::{EnvLocationProvider, FixedLocation, LocationProvider};

pub const ENV_REGISTRY: &str = "CASETRAIL_REGISTRY";
pub const ENV_CAPTURE_SCREENSHOTS: &str = "CASETRAIL_CAPTURE_SCREENSHOTS";
pub const ENV_VERSION: &str = "CASETRAIL_VERSION";
pub const ENV_STATUS_MAPPING: &str = "CASETRAIL_STATUS_MAPPING";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrailConfig {
    /// Root directory under which `TestRun-*` directories are created.
    pub registry_root: Option<PathBuf>,

    /// Whether the action recorder captures screenshots.
    pub capture_screenshots: bool,

    /// Version label stamped on the run; defaults to the crate version.
    pub version: Option<String>,

    /// JSON file with extra framework status mappings.
    pub status_mapping: Option<PathBuf>,
}

impl TrailConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| TrailError::Config(e.to_string()))
    }

    /// Read a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Configuration from the process environment only.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup, e.g. `std::env::var`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_REGISTRY).filter(|v| !v.trim().is_empty()) {
            self.registry_root = Some(PathBuf::from(root));
        }
        if let Some(flag) = lookup(ENV_CAPTURE_SCREENSHOTS) {
            self.capture_screenshots = parse_bool(ENV_CAPTURE_SCREENSHOTS, &flag)?;
        }
        if let Some(version) = lookup(ENV_VERSION).filter(|v| !v.trim().is_empty()) {
            self.version = Some(version);
        }
        if let Some(mapping) = lookup(ENV_STATUS_MAPPING).filter(|v| !v.trim().is_empty()) {
            self.status_mapping = Some(PathBuf::from(mapping));
        }
        Ok(self)
    }

    /// Version label for the run.
    pub fn resolved_version(&self) -> String {
        self.version
            .clone()
            .unwrap_or_else(|| crate::VERSION.to_string())
    }

    /// Location provider implied by this configuration.
    pub fn location_provider(&self) -> Box<dyn LocationProvider> {
        match &self.registry_root {
            Some(root) => Box::new(FixedLocation(root.clone())),
            None => Box::new(EnvLocationProvider),
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(TrailError::Config(format!(
            "{key}: expected a boolean, got {other:?}"
        ))),
    }
}
