//! Lifecycle correlation: maps runner callbacks onto case timelines.
//!
//! Test runners report configuration (setup/teardown) phases and tests as
//! flat start/end pairs. The [`Correlator`] decides which
//! [`CaseExecution`](crate::domain::CaseExecution) each callback belongs to:
//!
//! - class- and test-scoped configuration always gets its own pseudo-case;
//! - a method-scoped *before* configuration opens a case that the very next
//!   test on the same thread takes over, so setup and test share one
//!   timeline;
//! - a second before-method with no test in between abandons the first and
//!   opens a fresh case;
//! - a test that does not directly follow a before-method opens a new case.
//!
//! State is tracked per thread, so runners that execute tests in parallel
//! get independent timelines.
//!
//! Callbacks that arrive out of order (an end with nothing open, a status
//! change after the case ended) are logged and ignored; they never panic,
//! because the callback source is outside our control.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use serde::{Deserialize, Serialize};

use crate::action::ACTION_SOURCE;
use crate::domain::{Event, TestStatus, INFO};
use crate::error::Result;
use crate::metrics::METRICS;
use crate::registry::{CaseHandle, Registry};
use crate::serializer::ArtifactHandle;

/// `source` of events raised by the test runner.
pub const RUNNER_SOURCE: &str = "test-runner";
/// `source` of events raised for configuration phases.
pub const CONFIGURATION_SOURCE: &str = "configuration";

/// Granularity of a configuration phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigScope {
    Method,
    Class,
    Test,
}

/// Whether a configuration phase runs before or after its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigurationPhase {
    pub scope: ConfigScope,
    pub direction: Direction,
}

impl ConfigurationPhase {
    pub const BEFORE_METHOD: Self = Self::new(ConfigScope::Method, Direction::Before);
    pub const AFTER_METHOD: Self = Self::new(ConfigScope::Method, Direction::After);
    pub const BEFORE_CLASS: Self = Self::new(ConfigScope::Class, Direction::Before);
    pub const AFTER_CLASS: Self = Self::new(ConfigScope::Class, Direction::After);
    pub const BEFORE_TEST: Self = Self::new(ConfigScope::Test, Direction::Before);
    pub const AFTER_TEST: Self = Self::new(ConfigScope::Test, Direction::After);

    pub const fn new(scope: ConfigScope, direction: Direction) -> Self {
        Self { scope, direction }
    }

    pub fn is_before_method(&self) -> bool {
        *self == Self::BEFORE_METHOD
    }

    /// Class- and test-scoped phases stand outside any single test.
    pub fn is_outer(&self) -> bool {
        self.scope != ConfigScope::Method
    }
}

impl fmt::Display for ConfigurationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            Direction::Before => "before",
            Direction::After => "after",
        };
        let scope = match self.scope {
            ConfigScope::Method => "method",
            ConfigScope::Class => "class",
            ConfigScope::Test => "test",
        };
        write!(f, "{direction}-{scope}")
    }
}

/// Where the calling thread stands in the callback stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationState {
    /// No case is open.
    Idle,
    /// A case is open and receives events.
    Active(CaseHandle),
    /// A before-method phase ran; the next test on this thread takes over
    /// its case.
    AwaitingTest(CaseHandle),
}

impl CorrelationState {
    fn case(&self) -> Option<CaseHandle> {
        match self {
            CorrelationState::Idle => None,
            CorrelationState::Active(h) | CorrelationState::AwaitingTest(h) => Some(*h),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ThreadSlot {
    state: CorrelationState,
    /// The running configuration phase is recording into a case it did not
    /// open, so its end must not seal that case.
    borrowed: bool,
}

impl Default for ThreadSlot {
    fn default() -> Self {
        Self {
            state: CorrelationState::Idle,
            borrowed: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Incoming {
    Test,
    Configuration(ConfigurationPhase),
}

/// Serializable form of every callback the correlator accepts.
///
/// Used to feed recorded callback streams (JSON lines) through
/// [`Correlator::dispatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleCallback {
    RunStart,
    RunEnd,
    CaseStart {
        name: String,
    },
    CaseEnd,
    ConfigurationStart {
        name: String,
        scope: ConfigScope,
        direction: Direction,
    },
    ConfigurationEnd {
        scope: ConfigScope,
        direction: Direction,
        outcome: TestStatus,
    },
    Event {
        content: String,
        #[serde(default = "default_level")]
        level: String,
    },
    Status {
        outcome: TestStatus,
    },
    Action {
        command: String,
        #[serde(default)]
        param: Option<String>,
        #[serde(default)]
        locator: Option<String>,
        #[serde(default)]
        screenshot: Option<PathBuf>,
        #[serde(default)]
        sequence: Option<u32>,
    },
}

fn default_level() -> String {
    INFO.to_string()
}

impl LifecycleCallback {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleCallback::RunStart => "run_start",
            LifecycleCallback::RunEnd => "run_end",
            LifecycleCallback::CaseStart { .. } => "case_start",
            LifecycleCallback::CaseEnd => "case_end",
            LifecycleCallback::ConfigurationStart { .. } => "configuration_start",
            LifecycleCallback::ConfigurationEnd { .. } => "configuration_end",
            LifecycleCallback::Event { .. } => "event",
            LifecycleCallback::Status { .. } => "status",
            LifecycleCallback::Action { .. } => "action",
        }
    }
}

/// Drives a [`Registry`] from lifecycle callbacks.
pub struct Correlator {
    registry: Arc<Registry>,
    slots: Mutex<HashMap<ThreadId, ThreadSlot>>,
}

impl Correlator {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ThreadId, ThreadSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self) -> ThreadSlot {
        self.slots()
            .get(&thread::current().id())
            .copied()
            .unwrap_or_default()
    }

    fn set_slot(&self, slot: ThreadSlot) {
        self.slots().insert(thread::current().id(), slot);
    }

    /// Correlation state of the calling thread.
    pub fn state(&self) -> CorrelationState {
        self.slot().state
    }

    /// Case currently receiving events on the calling thread.
    pub fn current_case(&self) -> Option<CaseHandle> {
        self.state().case()
    }

    pub fn on_run_start(&self) {
        self.registry.start_run();
    }

    /// Seal whatever is still open, stamp the run end, and persist.
    pub fn on_run_end(&self) -> Result<ArtifactHandle> {
        self.slots().clear();
        self.registry.seal_all_open();
        self.registry.end_run();

        let handle = self.registry.persist()?;
        let run = self.registry.current_run();
        crate::obs::emit_run_finished(&run.run_id.to_string(), run.cases.len(), run.event_count());
        METRICS.flush();
        Ok(handle)
    }

    pub fn on_case_start(&self, name: &str) {
        self.resolve(Incoming::Test, name);
    }

    pub fn on_case_end(&self) {
        let slot = self.slot();
        let Some(handle) = slot.state.case() else {
            self.violation("case_end", &"no case is open");
            return;
        };
        if matches!(slot.state, CorrelationState::AwaitingTest(_)) {
            self.violation("case_end", &"case ended before its test started");
        }
        self.seal(handle, "case_end");
        self.set_slot(ThreadSlot::default());
    }

    pub fn on_configuration_start(&self, name: &str, phase: ConfigurationPhase) {
        let handle = self.resolve(Incoming::Configuration(phase), name);
        let event = Event::new(
            CONFIGURATION_SOURCE,
            INFO,
            format!("{phase} configuration {name} started"),
        );
        self.append(handle, event, "configuration_start");
    }

    /// Close a configuration phase with its outcome.
    ///
    /// Only class- and test-scoped phases set the case status; a method-
    /// scoped outcome is recorded as an event only, since that case may
    /// become the following test's case.
    pub fn on_configuration_end(&self, phase: ConfigurationPhase, outcome: TestStatus) {
        let slot = self.slot();
        let Some(handle) = slot.state.case() else {
            self.violation("configuration_end", &"no configuration phase is open");
            return;
        };

        if phase.is_outer() {
            if let Err(e) = self.registry.set_status(handle, outcome) {
                self.violation("configuration_end", &e);
            }
        }
        let event = Event::new(
            CONFIGURATION_SOURCE,
            outcome.event_level(),
            format!("{phase} configuration finished: {outcome}"),
        );
        self.append(handle, event, "configuration_end");

        if slot.borrowed {
            self.set_slot(ThreadSlot {
                borrowed: false,
                ..slot
            });
            return;
        }
        match slot.state {
            CorrelationState::AwaitingTest(_) if phase.is_before_method() => {
                if let Err(e) = self.registry.park_case(handle) {
                    self.violation("configuration_end", &e);
                }
            }
            _ => {
                self.seal(handle, "configuration_end");
                self.set_slot(ThreadSlot::default());
            }
        }
    }

    /// Append a runner event to the current case.
    pub fn on_event(&self, content: &str, level: &str) {
        self.record(Event::new(RUNNER_SOURCE, level, content));
    }

    /// Append a pre-built event (e.g. from the browser action chain).
    pub fn record(&self, event: Event) {
        let Some(handle) = self.current_case() else {
            self.violation("event", &"no case is open");
            return;
        };
        self.append(handle, event, "event");
    }

    pub fn on_status(&self, outcome: TestStatus) {
        let Some(handle) = self.current_case() else {
            self.violation("status", &"no case is open");
            return;
        };
        if let Err(e) = self.registry.set_status(handle, outcome) {
            self.violation("status", &e);
        }
    }

    /// Apply one serialized callback. Returns the artifact on run end.
    pub fn dispatch(&self, callback: LifecycleCallback) -> Result<Option<ArtifactHandle>> {
        match callback {
            LifecycleCallback::RunStart => self.on_run_start(),
            LifecycleCallback::RunEnd => return self.on_run_end().map(Some),
            LifecycleCallback::CaseStart { name } => self.on_case_start(&name),
            LifecycleCallback::CaseEnd => self.on_case_end(),
            LifecycleCallback::ConfigurationStart {
                name,
                scope,
                direction,
            } => self.on_configuration_start(&name, ConfigurationPhase::new(scope, direction)),
            LifecycleCallback::ConfigurationEnd {
                scope,
                direction,
                outcome,
            } => self.on_configuration_end(ConfigurationPhase::new(scope, direction), outcome),
            LifecycleCallback::Event { content, level } => self.on_event(&content, &level),
            LifecycleCallback::Status { outcome } => self.on_status(outcome),
            LifecycleCallback::Action {
                command,
                param,
                locator,
                screenshot,
                sequence,
            } => {
                let content = match &locator {
                    Some(locator) => format!("{command} {locator}"),
                    None => command.clone(),
                };
                let mut event =
                    Event::new(ACTION_SOURCE, INFO, content).with_command(command, param);
                if let Some(locator) = locator {
                    event = event.with_locator(locator);
                }
                event = match (screenshot, sequence) {
                    (Some(path), Some(sequence)) => event.with_screenshot(sequence, path),
                    (Some(path), None) => event.with_unsequenced_screenshot(path),
                    (None, _) => event,
                };
                self.record(event);
            }
        }
        Ok(None)
    }

    /// Find or open the case for an incoming test or configuration phase,
    /// and move the calling thread to its next state.
    fn resolve(&self, incoming: Incoming, name: &str) -> CaseHandle {
        let slot = self.slot();

        let reuse = match (slot.state, incoming) {
            (CorrelationState::AwaitingTest(h), Incoming::Test) => Some(h),
            (CorrelationState::Active(h), Incoming::Configuration(phase)) if !phase.is_outer() => {
                Some(h)
            }
            _ => None,
        };

        let (handle, borrowed) = match reuse {
            Some(handle) => {
                if let Incoming::Test = incoming {
                    if let Err(e) = self.registry.claim_for_test(handle, name) {
                        self.violation("case_start", &e);
                    }
                }
                (handle, matches!(incoming, Incoming::Configuration(_)))
            }
            None => {
                if let Some(previous) = slot.state.case() {
                    if let CorrelationState::Active(_) = slot.state {
                        self.violation("case_start", &"previous case was never ended");
                    }
                    self.seal(previous, "abandon");
                }
                let is_configuration = matches!(incoming, Incoming::Configuration(_));
                (self.registry.open_case(name, is_configuration), false)
            }
        };

        let state = match incoming {
            Incoming::Configuration(phase) if phase.is_before_method() && !borrowed => {
                CorrelationState::AwaitingTest(handle)
            }
            _ => CorrelationState::Active(handle),
        };
        self.set_slot(ThreadSlot { state, borrowed });
        handle
    }

    fn append(&self, handle: CaseHandle, event: Event, callback: &str) {
        if let Err(e) = self.registry.append_event(handle, event) {
            self.violation(callback, &e);
        }
    }

    fn seal(&self, handle: CaseHandle, callback: &str) {
        if let Err(e) = self.registry.seal_case(handle) {
            self.violation(callback, &e);
        }
    }

    fn violation(&self, callback: &str, reason: &dyn fmt::Display) {
        METRICS.inc_protocol_violations();
        crate::obs::emit_protocol_violation(callback, reason);
    }
}
