//! Process-wide counters for correlation and persistence.
//!
//! The registry, correlator and serializer bump these as they go; the
//! correlator logs a [`MetricsSnapshot`] when a run ends. Counters are
//! cumulative across every run in the process, so callers interested in one
//! run compare two snapshots with [`MetricsSnapshot::since`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    cases_opened: AtomicU64,
    events_recorded: AtomicU64,
    screenshots_relocated: AtomicU64,
    relocation_failures: AtomicU64,
    protocol_violations: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub cases_opened: u64,
    pub events_recorded: u64,
    pub screenshots_relocated: u64,
    pub relocation_failures: u64,
    pub protocol_violations: u64,
}

impl MetricsSnapshot {
    /// Counts accumulated between `earlier` and `self`.
    pub fn since(&self, earlier: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            cases_opened: self.cases_opened.saturating_sub(earlier.cases_opened),
            events_recorded: self.events_recorded.saturating_sub(earlier.events_recorded),
            screenshots_relocated: self
                .screenshots_relocated
                .saturating_sub(earlier.screenshots_relocated),
            relocation_failures: self
                .relocation_failures
                .saturating_sub(earlier.relocation_failures),
            protocol_violations: self
                .protocol_violations
                .saturating_sub(earlier.protocol_violations),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            cases_opened: AtomicU64::new(0),
            events_recorded: AtomicU64::new(0),
            screenshots_relocated: AtomicU64::new(0),
            relocation_failures: AtomicU64::new(0),
            protocol_violations: AtomicU64::new(0),
        }
    }

    pub fn inc_cases_opened(&self) {
        self.cases_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_events_recorded(&self) {
        self.events_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_screenshots_relocated(&self) {
        self.screenshots_relocated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_relocation_failures(&self) {
        self.relocation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Out-of-order callbacks: an end with nothing open, a status after
    /// the case was sealed.
    pub fn inc_protocol_violations(&self) {
        self.protocol_violations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "protocol_violations", "counter incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cases_opened: self.cases_opened.load(Ordering::Relaxed),
            events_recorded: self.events_recorded.load(Ordering::Relaxed),
            screenshots_relocated: self.screenshots_relocated.load(Ordering::Relaxed),
            relocation_failures: self.relocation_failures.load(Ordering::Relaxed),
            protocol_violations: self.protocol_violations.load(Ordering::Relaxed),
        }
    }

    /// Log the current totals as one `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            cases_opened = s.cases_opened,
            events_recorded = s.events_recorded,
            screenshots_relocated = s.screenshots_relocated,
            relocation_failures = s.relocation_failures,
            protocol_violations = s.protocol_violations,
        );
    }
}
