//! One logical test case or configuration pseudo-case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Event, TestStatus};

/// Length of a generated trace id.
pub const TRACE_ID_LEN: usize = 16;

/// Label for the calling thread: its name when it has one, plus its id.
pub fn current_thread_label() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => format!("{}/{:?}", name, thread.id()),
        None => format!("{:?}", thread.id()),
    }
}

/// Timeline of a single case.
///
/// Mutation after creation goes through [`crate::Registry`], which freezes
/// `events`, `status` and `end_time` once the case is sealed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseExecution {
    /// Fully-qualified case identifier; may be filled in after creation.
    pub name: String,

    /// Arrival-ordered timeline.
    pub events: Vec<Event>,

    pub status: TestStatus,

    pub start_time: DateTime<Utc>,

    pub end_time: DateTime<Utc>,

    /// True for setup/teardown pseudo-cases.
    pub is_configuration_phase: bool,

    /// Thread that opened the case.
    pub owner_thread: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,
}

impl CaseExecution {
    /// Create a case owned by the calling thread, starting now.
    pub fn new(name: impl Into<String>, is_configuration_phase: bool) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            events: Vec::new(),
            status: TestStatus::Passed,
            start_time: now,
            end_time: now,
            is_configuration_phase,
            owner_thread: current_thread_label(),
            trace_id: None,
        }
    }

    pub fn append_event(&mut self, event: Event) -> &Event {
        self.events.push(event);
        &self.events[self.events.len() - 1]
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// Return the trace id, generating it on first call.
    ///
    /// Random hex components are concatenated until there are at least
    /// [`TRACE_ID_LEN`] characters, then the result is cut to exactly that
    /// length.
    pub fn generate_trace_id(&mut self) -> &str {
        self.trace_id.get_or_insert_with(|| {
            let mut id = String::with_capacity(TRACE_ID_LEN + 8);
            while id.len() < TRACE_ID_LEN {
                let component = Uuid::new_v4().as_u128() as u32;
                id.push_str(&format!("{component:x}"));
            }
            id.truncate(TRACE_ID_LEN);
            id
        })
    }

    /// Wall time between start and end, in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}
