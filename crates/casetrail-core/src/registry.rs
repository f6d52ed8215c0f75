//! Owner of the run being recorded.
//!
//! The [`Registry`] holds the [`RunResult`], the run's on-disk
//! [`RunLayout`] and the bookkeeping that freezes sealed cases. Every
//! mutation of the run goes through it, behind a single mutex.
//!
//! Hosts normally construct one explicitly and share it through an `Arc`.
//! Adapters that can only be instantiated by reflection-style frameworks can
//! use [`Registry::global_or_init`], which lazily builds at most one instance
//! per process. There is no way to reset the global instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};

use chrono::{Local, Utc};
use tracing::{debug, info};

use crate::config::TrailConfig;
use crate::domain::{CaseExecution, Event, RunResult, TestStatus};
use crate::error::{Result, TrailError};
use crate::location::{LocationProvider, RunLayout};
use crate::metrics::METRICS;
use crate::serializer::{ArtifactHandle, ResultSerializer};

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();
static GLOBAL_INIT: Mutex<()> = Mutex::new(());

/// Stable reference to a case inside the registry's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaseHandle(usize);

impl CaseHandle {
    /// Position of the case in `RunResult::cases`.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for CaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct RegistryState {
    run: RunResult,
    /// Parallel to `run.cases`.
    sealed: Vec<bool>,
    /// Most recently opened case per thread.
    latest: HashMap<ThreadId, usize>,
}

pub struct Registry {
    layout: RunLayout,
    version: String,
    state: Mutex<RegistryState>,
}

impl Registry {
    /// Resolve the registry root, create this run's directory with an empty
    /// evidence sub-directory, and start an empty run.
    pub fn new(provider: &dyn LocationProvider, config: &TrailConfig) -> Result<Self> {
        let root = provider.registry_root()?;
        let layout = RunLayout::create(&root, Local::now())?;
        info!(run_dir = %layout.run_dir().display(), "test run directory created");
        Ok(Self::with_layout(layout, config.resolved_version()))
    }

    /// Build a registry over an already-created layout.
    pub fn with_layout(layout: RunLayout, version: impl Into<String>) -> Self {
        Self {
            layout,
            version: version.into(),
            state: Mutex::new(RegistryState {
                run: RunResult::new(),
                sealed: Vec::new(),
                latest: HashMap::new(),
            }),
        }
    }

    /// The process-wide registry, built by `init` on first access.
    ///
    /// Concurrent first callers are serialized; `init` runs at most once
    /// successfully. A failing `init` leaves the slot empty.
    pub fn global_or_init<F>(init: F) -> Result<Arc<Registry>>
    where
        F: FnOnce() -> Result<Registry>,
    {
        if let Some(registry) = GLOBAL.get() {
            return Ok(Arc::clone(registry));
        }
        let _guard = GLOBAL_INIT.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(registry) = GLOBAL.get() {
            return Ok(Arc::clone(registry));
        }
        let registry = Arc::new(init()?);
        // Cannot already be set: writers hold GLOBAL_INIT.
        let _ = GLOBAL.set(Arc::clone(&registry));
        Ok(registry)
    }

    /// The process-wide registry, if one was initialised.
    pub fn global() -> Option<Arc<Registry>> {
        GLOBAL.get().cloned()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    /// Snapshot of the run as recorded so far.
    pub fn current_run(&self) -> RunResult {
        self.state().run.clone()
    }

    pub fn start_run(&self) {
        let mut state = self.state();
        state.run.start_time = Some(Utc::now());
        state.run.version = self.version.clone();
        crate::obs::emit_run_started(&state.run.run_id.to_string(), &self.version);
    }

    pub fn end_run(&self) {
        self.state().run.end_time = Some(Utc::now());
    }

    /// Append a new case owned by the calling thread.
    pub fn open_case(&self, name: impl Into<String>, is_configuration: bool) -> CaseHandle {
        let case = CaseExecution::new(name, is_configuration);
        let mut state = self.state();
        let index = state.run.cases.len();
        crate::obs::emit_case_opened(index, &case.name, is_configuration);
        state.run.cases.push(case);
        state.sealed.push(false);
        state.latest.insert(thread::current().id(), index);
        METRICS.inc_cases_opened();
        CaseHandle(index)
    }

    /// Most recently opened case of the calling thread.
    pub fn current_case(&self) -> Option<CaseHandle> {
        self.state()
            .latest
            .get(&thread::current().id())
            .copied()
            .map(CaseHandle)
    }

    /// Snapshot of one case.
    pub fn case(&self, handle: CaseHandle) -> Option<CaseExecution> {
        self.state().run.cases.get(handle.0).cloned()
    }

    pub fn is_sealed(&self, handle: CaseHandle) -> bool {
        self.state().sealed.get(handle.0).copied().unwrap_or(false)
    }

    /// Run `f` against an unsealed case.
    fn mutate<T>(&self, handle: CaseHandle, f: impl FnOnce(&mut CaseExecution) -> T) -> Result<T> {
        let mut state = self.state();
        match state.sealed.get(handle.0) {
            None => return Err(TrailError::UnknownCase(handle.0)),
            Some(true) => return Err(TrailError::CaseSealed(handle.0)),
            Some(false) => {}
        }
        Ok(f(&mut state.run.cases[handle.0]))
    }

    pub fn append_event(&self, handle: CaseHandle, event: Event) -> Result<()> {
        self.mutate(handle, |case| {
            case.append_event(event);
        })?;
        METRICS.inc_events_recorded();
        Ok(())
    }

    pub fn set_status(&self, handle: CaseHandle, status: TestStatus) -> Result<()> {
        self.mutate(handle, |case| case.status = status)
    }

    pub fn set_name(&self, handle: CaseHandle, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.mutate(handle, |case| case.name = name)
    }

    /// Turn a (configuration) case into the named test that now owns it.
    pub fn claim_for_test(&self, handle: CaseHandle, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.mutate(handle, |case| {
            case.name = name;
            case.is_configuration_phase = false;
        })
    }

    /// Record a provisional end time without freezing the case.
    pub fn park_case(&self, handle: CaseHandle) -> Result<()> {
        self.mutate(handle, |case| case.end_time = Utc::now())
    }

    /// Set the end time and freeze the case.
    pub fn seal_case(&self, handle: CaseHandle) -> Result<()> {
        let mut state = self.state();
        match state.sealed.get(handle.0) {
            None => return Err(TrailError::UnknownCase(handle.0)),
            Some(true) => return Err(TrailError::CaseSealed(handle.0)),
            Some(false) => {}
        }
        state.sealed[handle.0] = true;
        let case = &mut state.run.cases[handle.0];
        case.end_time = Utc::now();
        let _span = crate::obs::CaseSpan::enter(handle.0, &case.name);
        crate::obs::emit_case_sealed(
            handle.0,
            &case.name,
            case.status.as_str(),
            case.events.len(),
        );
        Ok(())
    }

    /// Seal the calling thread's current case.
    ///
    /// Returns false, with a diagnostic, when there is no unsealed case.
    pub fn seal_current_case(&self) -> bool {
        let Some(handle) = self.current_case() else {
            crate::obs::emit_protocol_violation("seal", &"no case has been opened");
            return false;
        };
        match self.seal_case(handle) {
            Ok(()) => true,
            Err(e) => {
                crate::obs::emit_protocol_violation("seal", &e);
                false
            }
        }
    }

    /// Seal every case that is still open. Returns how many were sealed.
    pub fn seal_all_open(&self) -> usize {
        let open: Vec<usize> = {
            let state = self.state();
            state
                .sealed
                .iter()
                .enumerate()
                .filter(|(_, sealed)| !**sealed)
                .map(|(i, _)| i)
                .collect()
        };
        let mut count = 0;
        for index in open {
            if self.seal_case(CaseHandle(index)).is_ok() {
                count += 1;
            }
        }
        if count > 0 {
            debug!(count, "sealed cases left open at run end");
        }
        count
    }

    /// Trace id of a case, generated on first request.
    pub fn trace_id(&self, handle: CaseHandle) -> Result<String> {
        let mut state = self.state();
        let case = state
            .run
            .cases
            .get_mut(handle.0)
            .ok_or(TrailError::UnknownCase(handle.0))?;
        Ok(case.generate_trace_id().to_string())
    }

    /// Relocate evidence and write the result document for this run.
    pub fn persist(&self) -> Result<ArtifactHandle> {
        let serializer = ResultSerializer::new(self.layout.clone());
        let mut state = self.state();
        serializer.persist(&mut state.run)
    }
}
