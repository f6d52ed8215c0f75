//! Structured observability hooks for the run lifecycle.
//!
//! This module provides:
//! - Case-scoped tracing spans via the `CaseSpan` RAII guard
//! - Emission functions for lifecycle events: run start/finish, case
//!   open/seal, evidence relocation failures and protocol violations
//!
//! Events are emitted at `info!` level, except failures which use `warn!`.
//! For JSON output, initialise tracing with `init_tracing(true, ..)`.

use std::path::Path;

use tracing::{debug, info, warn};

/// RAII guard that enters a case-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = CaseSpan::enter(3, "LoginTest.validCredentials");
/// // tracing calls made here carry case = 3
/// ```
pub struct CaseSpan {
    _span: tracing::span::EnteredSpan,
}

impl CaseSpan {
    pub fn enter(case: usize, name: &str) -> Self {
        let span = tracing::info_span!("casetrail.case", case = case, name = %name);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, version: &str) {
    info!(event = "run.started", run_id = %run_id, version = %version);
}

/// Emit event: run finished with case and event totals.
pub fn emit_run_finished(run_id: &str, cases: usize, events: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        cases = cases,
        events = events,
    );
}

/// Emit event: a case (or configuration pseudo-case) was opened.
pub fn emit_case_opened(case: usize, name: &str, configuration: bool) {
    debug!(
        event = "case.opened",
        case = case,
        name = %name,
        configuration = configuration,
    );
}

/// Emit event: a case was sealed.
pub fn emit_case_sealed(case: usize, name: &str, status: &str, events: usize) {
    debug!(
        event = "case.sealed",
        case = case,
        name = %name,
        status = %status,
        events = events,
    );
}

/// Emit event: the result document was written.
pub fn emit_result_persisted(path: &Path, relocated: usize, failed: usize) {
    info!(
        event = "result.persisted",
        path = %path.display(),
        relocated = relocated,
        failed = failed,
    );
}

/// Emit event: a screenshot could not be moved into the evidence directory.
pub fn emit_relocation_failed(path: &Path, error: &dyn std::fmt::Display) {
    warn!(
        event = "evidence.relocation_failed",
        path = %path.display(),
        error = %error,
    );
}

/// Emit event: a callback arrived that the current state cannot accept.
pub fn emit_protocol_violation(callback: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "protocol.violation", callback = %callback, reason = %reason);
}
