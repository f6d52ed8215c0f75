//! Case outcome.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Outcome of a case.
///
/// Framework-specific result names (JUnit `ABORTED`, TestNG `SKIP` ...) are
/// translated by [`crate::status_map::StatusMapper`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    #[default]
    Passed,
    Failed,
    Skipped,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Passed => "PASSED",
            TestStatus::Failed => "FAILED",
            TestStatus::Skipped => "SKIPPED",
        }
    }

    /// Severity tag used for the event that accompanies this outcome.
    pub fn event_level(&self) -> &'static str {
        match self {
            TestStatus::Passed => super::INFO,
            TestStatus::Skipped => super::WARNING,
            TestStatus::Failed => super::SEVERE,
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PASSED" => Ok(TestStatus::Passed),
            "FAILED" => Ok(TestStatus::Failed),
            "SKIPPED" => Ok(TestStatus::Skipped),
            other => Err(format!("unknown test status: {other}")),
        }
    }
}
