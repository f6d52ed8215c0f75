//! A single observed occurrence inside a case.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Informational severity tag.
pub const INFO: &str = "INFO";
/// Warning severity tag.
pub const WARNING: &str = "WARNING";
/// Failure severity tag.
pub const SEVERE: &str = "SEVERE";

/// A unique event ID (UUID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        EventId(Uuid::new_v4())
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// One entry on a case timeline.
///
/// `timestamp` is captured when the event is constructed and has no setter.
/// The automation fields are only populated by the browser action chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_id: EventId,

    /// Originating component, e.g. a module path or listener name.
    pub source: String,

    /// Severity tag (`INFO`, `WARNING`, `SEVERE`, ...).
    pub level: String,

    /// Human-readable description.
    pub content: String,

    timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_param: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator_description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_sequence_number: Option<u32>,

    /// Location of the captured screenshot; `None` means no evidence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,
}

impl Event {
    /// Create a new event stamped with the current time.
    pub fn new(
        source: impl Into<String>,
        level: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            source: source.into(),
            level: level.into(),
            content: content.into(),
            timestamp: Utc::now(),
            command_name: None,
            command_param: None,
            locator_description: None,
            screenshot_sequence_number: None,
            screenshot_path: None,
        }
    }

    pub fn with_command(mut self, name: impl Into<String>, param: Option<String>) -> Self {
        self.command_name = Some(name.into());
        self.command_param = param;
        self
    }

    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator_description = Some(locator.into());
        self
    }

    pub fn with_screenshot(mut self, sequence: u32, path: impl Into<PathBuf>) -> Self {
        self.screenshot_sequence_number = Some(sequence);
        self.screenshot_path = Some(path.into());
        self
    }

    /// Attach a screenshot with no capture sequence number; relocation then
    /// names it after the event's position in its case.
    pub fn with_unsequenced_screenshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.screenshot_sequence_number = None;
        self.screenshot_path = Some(path.into());
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The screenshot path, if one was captured and is non-empty.
    pub fn evidence(&self) -> Option<&Path> {
        self.screenshot_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_new_sets_timestamp() {
        let before = Utc::now();
        let event = Event::new("tests", INFO, "step1");
        let after = Utc::now();

        assert!(event.timestamp() >= before && event.timestamp() <= after);
        assert_eq!(event.level, "INFO");
        assert_eq!(event.content, "step1");
        assert!(event.evidence().is_none());
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = Event::new("tests", INFO, "a");
        let b = Event::new("tests", INFO, "b");
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn test_empty_screenshot_path_is_not_evidence() {
        let event = Event::new("tests", INFO, "click").with_screenshot(1, "");
        assert!(event.evidence().is_none());

        let event = Event::new("tests", INFO, "click").with_screenshot(2, "/tmp/shot.png");
        assert_eq!(event.evidence(), Some(Path::new("/tmp/shot.png")));
    }

    #[test]
    fn test_optional_fields_omitted_from_json() {
        let event = Event::new("tests", WARNING, "plain");
        let v = serde_json::to_value(&event).unwrap();
        let obj = v.as_object().unwrap();
        assert!(obj.contains_key("timestamp"));
        assert!(!obj.contains_key("command_name"));
        assert!(!obj.contains_key("screenshot_path"));
    }

    #[test]
    fn test_timestamp_serialized_as_rfc3339_text() {
        let event = Event::new("tests", INFO, "x");
        let v = serde_json::to_value(&event).unwrap();
        let ts = v["timestamp"].as_str().expect("timestamp is a string");
        let parsed: DateTime<Utc> = ts.parse().unwrap();
        assert_eq!(parsed, event.timestamp());
    }
}
