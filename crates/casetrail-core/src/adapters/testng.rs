//! TestNG listener surface over configuration methods and tests.

use std::sync::Arc;

use super::qualified;
use crate::correlator::{ConfigurationPhase, Correlator};
use crate::domain::{TestStatus, SEVERE, WARNING};
use crate::serializer::ArtifactHandle;

/// TestNG-style listener: suite execution, configuration methods and tests.
///
/// Case names are `<class>.<method>`.
pub struct TestNgAdapter {
    correlator: Arc<Correlator>,
}

impl TestNgAdapter {
    pub fn new(correlator: Arc<Correlator>) -> Self {
        Self { correlator }
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    pub fn on_execution_start(&self) {
        self.correlator.on_run_start();
    }

    pub fn on_execution_finish(&self) -> Option<ArtifactHandle> {
        super::finish_run(self.correlator.on_run_end())
    }

    pub fn before_configuration(&self, class: &str, method: &str, phase: ConfigurationPhase) {
        self.correlator
            .on_configuration_start(&qualified(class, method), phase);
    }

    pub fn on_configuration_success(&self, phase: ConfigurationPhase) {
        self.correlator
            .on_configuration_end(phase, TestStatus::Passed);
    }

    pub fn on_configuration_failure(&self, phase: ConfigurationPhase, failure: &str) {
        self.correlator.on_event(failure, SEVERE);
        self.correlator
            .on_configuration_end(phase, TestStatus::Failed);
    }

    pub fn on_configuration_skip(&self, phase: ConfigurationPhase) {
        self.correlator
            .on_configuration_end(phase, TestStatus::Skipped);
    }

    pub fn on_test_start(&self, class: &str, method: &str) {
        self.correlator.on_case_start(&qualified(class, method));
    }

    pub fn on_test_success(&self) {
        self.finish(TestStatus::Passed);
    }

    /// `failure` is the message or stack trace reported by the runner.
    pub fn on_test_failure(&self, failure: Option<&str>) {
        if let Some(failure) = failure {
            self.correlator.on_event(failure, SEVERE);
        }
        self.finish(TestStatus::Failed);
    }

    pub fn on_test_skipped(&self, reason: Option<&str>) {
        if let Some(reason) = reason {
            self.correlator.on_event(reason, WARNING);
        }
        self.finish(TestStatus::Skipped);
    }

    fn finish(&self, status: TestStatus) {
        self.correlator.on_status(status);
        self.correlator.on_case_end();
    }
}
