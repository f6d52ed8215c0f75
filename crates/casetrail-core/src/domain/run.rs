//! Root aggregate for one execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CaseExecution, TestStatus};

/// Everything recorded during one test run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    /// Unique identifier for this run.
    pub run_id: Uuid,

    /// Build/version label resolved at run start.
    pub version: String,

    /// When the run started (None until run-start is observed).
    pub start_time: Option<DateTime<Utc>>,

    /// When the run ended (None until run-end is observed).
    pub end_time: Option<DateTime<Utc>>,

    /// Cases in the order they were opened.
    pub cases: Vec<CaseExecution>,
}

impl RunResult {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            version: String::new(),
            start_time: None,
            end_time: None,
            cases: Vec::new(),
        }
    }

    /// Number of cases with the given status.
    pub fn count_status(&self, status: TestStatus) -> usize {
        self.cases.iter().filter(|c| c.status == status).count()
    }

    /// Total number of events across all cases.
    pub fn event_count(&self) -> usize {
        self.cases.iter().map(|c| c.events.len()).sum()
    }

    /// Cases that are real tests rather than configuration phases.
    pub fn tests(&self) -> impl Iterator<Item = &CaseExecution> {
        self.cases.iter().filter(|c| !c.is_configuration_phase)
    }
}

impl Default for RunResult {
    fn default() -> Self {
        Self::new()
    }
}
