//! JUnit platform (JUnit 5) execution-listener surface.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::correlator::Correlator;
use crate::domain::{TestStatus, SEVERE, WARNING};
use crate::serializer::ArtifactHandle;
use crate::status_map::StatusMapper;

/// The parts of a JUnit platform test identifier the adapter needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestIdentifier {
    pub display_name: String,
    /// Engines and classes are containers; only tests become cases.
    #[serde(default)]
    pub is_container: bool,
}

impl TestIdentifier {
    pub fn test(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            is_container: false,
        }
    }

    pub fn container(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            is_container: true,
        }
    }
}

/// JUnit platform execution listener.
///
/// Result names (`SUCCESSFUL`, `FAILED`, `ABORTED`, or anything added to
/// the [`StatusMapper`]) are translated into [`TestStatus`].
pub struct JUnitPlatformAdapter {
    correlator: Arc<Correlator>,
    mapper: StatusMapper,
}

impl JUnitPlatformAdapter {
    pub fn new(correlator: Arc<Correlator>) -> Self {
        Self::with_mapper(correlator, StatusMapper::with_defaults())
    }

    pub fn with_mapper(correlator: Arc<Correlator>, mapper: StatusMapper) -> Self {
        Self { correlator, mapper }
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    pub fn test_plan_started(&self) {
        self.correlator.on_run_start();
    }

    pub fn test_plan_finished(&self) -> Option<ArtifactHandle> {
        super::finish_run(self.correlator.on_run_end())
    }

    pub fn execution_started(&self, id: &TestIdentifier) {
        if id.is_container {
            return;
        }
        self.correlator.on_case_start(&id.display_name);
    }

    /// Skipped tests are never started, so they get a case of their own.
    pub fn execution_skipped(&self, id: &TestIdentifier, reason: &str) {
        if id.is_container {
            tracing::debug!(container = %id.display_name, reason, "container skipped");
            return;
        }
        self.correlator.on_case_start(&id.display_name);
        self.correlator.on_event(reason, WARNING);
        self.correlator.on_status(TestStatus::Skipped);
        self.correlator.on_case_end();
    }

    /// `result` is the platform's status name; `throwable` the failure text.
    pub fn execution_finished(&self, id: &TestIdentifier, result: &str, throwable: Option<&str>) {
        if id.is_container {
            return;
        }
        match self.mapper.map(result) {
            Some(status) => {
                if let Some(text) = throwable {
                    let level = if status == TestStatus::Failed {
                        SEVERE
                    } else {
                        WARNING
                    };
                    self.correlator.on_event(text, level);
                }
                self.correlator.on_status(status);
            }
            None => {
                tracing::warn!(test = %id.display_name, result, "unmapped result status");
            }
        }
        self.correlator.on_case_end();
    }
}
