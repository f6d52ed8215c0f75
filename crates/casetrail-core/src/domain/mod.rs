//! Timeline model for casetrail.
//!
//! Canonical definitions for the recorded entities:
//! - `Event`: one observed occurrence inside a case
//! - `CaseExecution`: one test case or one configuration pseudo-case
//! - `RunResult`: root aggregate for a single execution
//! - `TestStatus`: outcome of a case

pub mod case;
pub mod event;
pub mod run;
pub mod status;

pub use case::{current_thread_label, CaseExecution, TRACE_ID_LEN};
pub use event::{Event, EventId, INFO, SEVERE, WARNING};
pub use run::RunResult;
pub use status::TestStatus;
