//! JUnit 4 run-listener surface.

use std::sync::Arc;

use crate::correlator::Correlator;
use crate::domain::{TestStatus, SEVERE, WARNING};
use crate::serializer::ArtifactHandle;

/// JUnit 4 `RunListener` callbacks.
///
/// JUnit 4 reports a failure before `test_finished` for the same test, so
/// failures only mark the open case; `test_finished` seals it. Ignored tests
/// are never started and get a case of their own. Case names are
/// `<class>.<method>`.
pub struct JUnit4Adapter {
    correlator: Arc<Correlator>,
}

impl JUnit4Adapter {
    pub fn new(correlator: Arc<Correlator>) -> Self {
        Self { correlator }
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    pub fn test_run_started(&self) {
        self.correlator.on_run_start();
    }

    pub fn test_run_finished(&self) -> Option<ArtifactHandle> {
        super::finish_run(self.correlator.on_run_end())
    }

    pub fn test_started(&self, class: &str, method: &str) {
        self.correlator.on_case_start(&super::qualified(class, method));
    }

    /// Leaves the status alone; a failure reported earlier must stand.
    pub fn test_finished(&self) {
        self.correlator.on_case_end();
    }

    pub fn test_failure(&self, failure: &str) {
        self.correlator.on_event(failure, SEVERE);
        self.correlator.on_status(TestStatus::Failed);
    }

    /// An assumption that did not hold skips the running test.
    pub fn test_assumption_failure(&self, failure: &str) {
        self.correlator.on_event(failure, WARNING);
        self.correlator.on_status(TestStatus::Skipped);
    }

    pub fn test_ignored(&self, class: &str, method: &str) {
        self.correlator.on_case_start(&super::qualified(class, method));
        self.correlator.on_status(TestStatus::Skipped);
        self.correlator.on_case_end();
    }
}
