//! casetrail core library
//!
//! Correlates test-runner lifecycle callbacks into per-case timelines and
//! persists them, with relocated screenshot evidence, as one result
//! document per run.

pub mod action;
pub mod adapters;
pub mod config;
pub mod correlator;
pub mod domain;
pub mod error;
pub mod location;
pub mod metrics;
pub mod obs;
pub mod registry;
pub mod serializer;
pub mod status_map;
pub mod telemetry;

pub use action::{ActionKind, ActionRecorder, DriverAction, ScreenshotSource, ACTION_SOURCE};
pub use adapters::{JUnit4Adapter, JUnitPlatformAdapter, TestIdentifier, TestNgAdapter};
pub use config::TrailConfig;
pub use correlator::{
    ConfigScope, ConfigurationPhase, CorrelationState, Correlator, Direction, LifecycleCallback,
    CONFIGURATION_SOURCE, RUNNER_SOURCE,
};
pub use domain::{
    current_thread_label, CaseExecution, Event, EventId, RunResult, TestStatus, INFO, SEVERE,
    TRACE_ID_LEN, WARNING,
};
pub use error::{Result, TrailError};
pub use location::{
    run_directory_name, EnvLocationProvider, FixedLocation, LocationProvider, RunLayout,
    DIGEST_FILE, EVIDENCE_DIR, RESULT_FILE,
};
pub use registry::{CaseHandle, Registry};
pub use serializer::{
    evidence_file_name, read_result, ArtifactHandle, RelocationReport, ResultSerializer,
};
pub use status_map::StatusMapper;

pub use metrics::{MetricsSnapshot, METRICS};
pub use obs::{
    emit_case_opened, emit_case_sealed, emit_protocol_violation, emit_relocation_failed,
    emit_result_persisted, emit_run_finished, emit_run_started, CaseSpan,
};
pub use telemetry::init_tracing;

/// casetrail version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
