//! Browser action recording.
//!
//! The driver's listener chain reports each action as a [`DriverAction`].
//! [`ActionRecorder`] turns it into an automation [`Event`] on the current
//! case and, when screenshot capture is on, attaches evidence for actions
//! that change what the user sees.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use serde::{Deserialize, Serialize};

use crate::config::TrailConfig;
use crate::correlator::Correlator;
use crate::domain::{Event, INFO};
use crate::error::Result;

/// `source` of events raised by the action chain.
pub const ACTION_SOURCE: &str = "browser-action";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Get,
    Close,
    Quit,
    Back,
    Forward,
    Refresh,
    Click,
    Clear,
    Submit,
    SendKeys,
    FindElement,
    GetText,
    Dismiss,
    Accept,
    AlertSendKeys,
    ExecuteScript,
}

impl ActionKind {
    pub fn command_name(&self) -> &'static str {
        match self {
            ActionKind::Get => "get",
            ActionKind::Close => "close",
            ActionKind::Quit => "quit",
            ActionKind::Back => "back",
            ActionKind::Forward => "forward",
            ActionKind::Refresh => "refresh",
            ActionKind::Click => "click",
            ActionKind::Clear => "clear",
            ActionKind::Submit => "submit",
            ActionKind::SendKeys => "sendKeys",
            ActionKind::FindElement => "findElement",
            ActionKind::GetText => "getText",
            ActionKind::Dismiss => "dismiss",
            ActionKind::Accept => "accept",
            ActionKind::AlertSendKeys => "alertSendKeys",
            ActionKind::ExecuteScript => "executeScript",
        }
    }
}

/// One action reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverAction {
    pub kind: ActionKind,
    /// URL, keys, script text ... depending on the action.
    #[serde(default)]
    pub param: Option<String>,
    /// Description of the element locator, for element actions.
    #[serde(default)]
    pub locator: Option<String>,
}

impl DriverAction {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            param: None,
            locator: None,
        }
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }
}

/// Produces a screenshot file on demand.
pub trait ScreenshotSource: Send + Sync {
    fn capture(&self) -> Result<PathBuf>;
}

pub struct ActionRecorder {
    correlator: Arc<Correlator>,
    screenshots: Option<Box<dyn ScreenshotSource>>,
    sequence: AtomicU32,
    /// Last send-keys locator per thread, so typing into one field
    /// character by character yields one screenshot.
    last_send_keys: Mutex<HashMap<ThreadId, String>>,
}

impl ActionRecorder {
    /// Recorder that never captures screenshots.
    pub fn new(correlator: Arc<Correlator>) -> Self {
        Self {
            correlator,
            screenshots: None,
            sequence: AtomicU32::new(0),
            last_send_keys: Mutex::new(HashMap::new()),
        }
    }

    /// Recorder that captures evidence through `source`.
    pub fn with_screenshots(correlator: Arc<Correlator>, source: Box<dyn ScreenshotSource>) -> Self {
        Self {
            screenshots: Some(source),
            ..Self::new(correlator)
        }
    }

    /// Capture through `source` only when `capture_screenshots` is set.
    pub fn from_config(
        correlator: Arc<Correlator>,
        config: &TrailConfig,
        source: Box<dyn ScreenshotSource>,
    ) -> Self {
        if config.capture_screenshots {
            Self::with_screenshots(correlator, source)
        } else {
            Self::new(correlator)
        }
    }

    pub fn capture_enabled(&self) -> bool {
        self.screenshots.is_some()
    }

    /// Record `action` on the calling thread's current case and return the
    /// event that was built for it.
    pub fn record(&self, action: &DriverAction) -> Event {
        let content = match &action.locator {
            Some(locator) => format!("{} {}", action.kind.command_name(), locator),
            None => action.kind.command_name().to_string(),
        };
        let mut event = Event::new(ACTION_SOURCE, INFO, content)
            .with_command(action.kind.command_name(), action.param.clone());
        if let Some(locator) = &action.locator {
            event = event.with_locator(locator.clone());
        }

        if let Some(source) = &self.screenshots {
            if self.wants_evidence(action) {
                match source.capture() {
                    Ok(path) => {
                        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                        event = event.with_screenshot(sequence, path);
                    }
                    Err(e) => {
                        tracing::warn!(command = action.kind.command_name(), error = %e, "screenshot capture failed");
                    }
                }
            }
        }

        self.correlator.record(event.clone());
        event
    }

    /// Number of screenshots taken so far.
    pub fn screenshots_taken(&self) -> u32 {
        self.sequence.load(Ordering::SeqCst)
    }

    fn wants_evidence(&self, action: &DriverAction) -> bool {
        match action.kind {
            ActionKind::Get
            | ActionKind::Close
            | ActionKind::Back
            | ActionKind::Forward
            | ActionKind::Click
            | ActionKind::Clear
            | ActionKind::Submit
            | ActionKind::Dismiss
            | ActionKind::Accept
            | ActionKind::AlertSendKeys => true,
            ActionKind::ExecuteScript => action
                .param
                .as_deref()
                .is_some_and(|script| script.contains("click")),
            ActionKind::SendKeys => self.is_new_send_keys_target(action.locator.as_deref()),
            ActionKind::Quit | ActionKind::Refresh | ActionKind::FindElement | ActionKind::GetText => {
                false
            }
        }
    }

    fn is_new_send_keys_target(&self, locator: Option<&str>) -> bool {
        let Some(locator) = locator else {
            return true;
        };
        let mut last = self
            .last_send_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = last.insert(thread::current().id(), locator.to_string());
        previous.as_deref() != Some(locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrailError;
    use crate::location::RunLayout;
    use crate::registry::Registry;
    use chrono::Local;

    struct FakeCamera {
        dir: PathBuf,
        taken: AtomicU32,
    }

    impl ScreenshotSource for FakeCamera {
        fn capture(&self) -> Result<PathBuf> {
            let n = self.taken.fetch_add(1, Ordering::SeqCst);
            let path = self.dir.join(format!("raw-{n}.png"));
            std::fs::write(&path, b"png")?;
            Ok(path)
        }
    }

    struct BrokenCamera;

    impl ScreenshotSource for BrokenCamera {
        fn capture(&self) -> Result<PathBuf> {
            Err(TrailError::Capture("driver gone".to_string()))
        }
    }

    fn correlator(dir: &std::path::Path) -> Arc<Correlator> {
        let layout = RunLayout::create(dir, Local::now()).unwrap();
        Arc::new(Correlator::new(Arc::new(Registry::with_layout(layout, "t"))))
    }

    #[test]
    fn test_record_without_capture() {
        let dir = tempfile::tempdir().unwrap();
        let correlator = correlator(dir.path());
        correlator.on_case_start("suite.T");
        let recorder = ActionRecorder::new(Arc::clone(&correlator));

        let event = recorder.record(&DriverAction::new(ActionKind::Get).with_param("https://example.com"));

        assert!(!recorder.capture_enabled());
        assert!(event.evidence().is_none());
        assert_eq!(event.command_name.as_deref(), Some("get"));
        assert_eq!(event.command_param.as_deref(), Some("https://example.com"));
        let case = correlator.registry().case(correlator.current_case().unwrap()).unwrap();
        assert_eq!(case.events.len(), 1);
    }

    #[test]
    fn test_capture_policy_and_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let correlator = correlator(dir.path());
        correlator.on_case_start("suite.T");
        let camera = FakeCamera {
            dir: dir.path().to_path_buf(),
            taken: AtomicU32::new(0),
        };
        let recorder = ActionRecorder::with_screenshots(Arc::clone(&correlator), Box::new(camera));

        let click = recorder.record(&DriverAction::new(ActionKind::Click).with_locator("By.id: go"));
        let find = recorder.record(&DriverAction::new(ActionKind::FindElement).with_locator("By.id: go"));
        let script = recorder.record(&DriverAction::new(ActionKind::ExecuteScript).with_param("arguments[0].click()"));
        let typed_a = recorder.record(&DriverAction::new(ActionKind::SendKeys).with_locator("By.name: q"));
        let typed_b = recorder.record(&DriverAction::new(ActionKind::SendKeys).with_locator("By.name: q"));
        let typed_c = recorder.record(&DriverAction::new(ActionKind::SendKeys).with_locator("By.name: other"));

        assert_eq!(click.screenshot_sequence_number, Some(1));
        assert!(find.evidence().is_none());
        assert_eq!(script.screenshot_sequence_number, Some(2));
        assert_eq!(typed_a.screenshot_sequence_number, Some(3));
        assert!(typed_b.evidence().is_none());
        assert_eq!(typed_c.screenshot_sequence_number, Some(4));
        assert_eq!(recorder.screenshots_taken(), 4);
    }

    #[test]
    fn test_from_config_respects_flag() {
        let dir = tempfile::tempdir().unwrap();
        let correlator = correlator(dir.path());

        let off = ActionRecorder::from_config(
            Arc::clone(&correlator),
            &TrailConfig::default(),
            Box::new(BrokenCamera),
        );
        let on = ActionRecorder::from_config(
            correlator,
            &TrailConfig {
                capture_screenshots: true,
                ..Default::default()
            },
            Box::new(BrokenCamera),
        );
        assert!(!off.capture_enabled());
        assert!(on.capture_enabled());
    }

    #[test]
    fn test_capture_failure_still_records_event() {
        let dir = tempfile::tempdir().unwrap();
        let correlator = correlator(dir.path());
        correlator.on_case_start("suite.T");
        let recorder = ActionRecorder::with_screenshots(Arc::clone(&correlator), Box::new(BrokenCamera));

        let event = recorder.record(&DriverAction::new(ActionKind::Submit));

        assert!(event.evidence().is_none());
        assert_eq!(recorder.screenshots_taken(), 0);
        let case = correlator.registry().case(correlator.current_case().unwrap()).unwrap();
        assert_eq!(case.events.len(), 1);
    }
}
