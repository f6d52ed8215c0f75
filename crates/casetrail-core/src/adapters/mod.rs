//! Bindings from concrete test frameworks to the [`Correlator`].
//!
//! Each adapter exposes the callbacks its framework's listener interface
//! delivers and forwards them as generic lifecycle callbacks.
//!
//! [`Correlator`]: crate::correlator::Correlator

pub mod junit;
pub mod junit4;
pub mod testng;

pub use junit::{JUnitPlatformAdapter, TestIdentifier};
pub use junit4::JUnit4Adapter;
pub use testng::TestNgAdapter;

use crate::error::Result;
use crate::serializer::ArtifactHandle;

/// Listener interfaces cannot propagate errors, so a failed persist is
/// logged here and surfaces as `None`.
fn finish_run(result: Result<ArtifactHandle>) -> Option<ArtifactHandle> {
    match result {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::error!(error = %e, "failed to write test result");
            None
        }
    }
}

/// `<class>.<method>`, or just the method when the class is unknown.
fn qualified(class: &str, method: &str) -> String {
    if class.is_empty() {
        method.to_string()
    } else {
        format!("{class}.{method}")
    }
}
