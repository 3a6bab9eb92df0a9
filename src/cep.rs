//! Complex alert events
//!
//! Structured events fired when a rule trips, delivered on their own
//! dispatcher so alert consumers never sit on the metric hot path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default category stamped on rule-fired events.
pub const DEFAULT_EVENT_CATEGORY: &str = "metric-rules";

/// Event severity levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    /// Informational event
    #[default]
    Info,
    /// Warning - attention may be needed
    Warning,
    /// Error - something went wrong
    Error,
    /// Critical - immediate attention required
    Critical,
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A structured alert event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexEvent {
    /// Id of the artifact (metric) the event is about
    pub artifact_id: Option<String>,
    /// Event name within the category, e.g. "load"
    pub event_name: Option<String>,
    /// Event category, defaults to "metric-rules"
    pub event_category: String,
    /// Severity, defaults to Info
    pub severity: EventSeverity,
    /// Human-readable message
    pub message: Option<String>,
    /// Machine-readable code
    pub code: Option<String>,
    /// Creation time
    pub created: DateTime<Utc>,
}

impl ComplexEvent {
    pub fn new() -> Self {
        Self {
            artifact_id: None,
            event_name: None,
            event_category: DEFAULT_EVENT_CATEGORY.to_string(),
            severity: EventSeverity::Info,
            message: None,
            code: None,
            created: Utc::now(),
        }
    }

    pub fn with_artifact_id(mut self, id: impl Into<String>) -> Self {
        self.artifact_id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.event_name = Some(name.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.event_category = category.into();
        self
    }

    pub fn with_severity(mut self, severity: EventSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl Default for ComplexEvent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let event = ComplexEvent::new();
        assert_eq!(event.event_category, DEFAULT_EVENT_CATEGORY);
        assert_eq!(event.severity, EventSeverity::Info);
        assert!(event.artifact_id.is_none());
    }

    #[test]
    fn test_builder() {
        let event = ComplexEvent::new()
            .with_artifact_id("system")
            .with_name("load")
            .with_severity(EventSeverity::Error)
            .with_code("E42");
        assert_eq!(event.artifact_id.as_deref(), Some("system"));
        assert_eq!(event.event_name.as_deref(), Some("load"));
        assert_eq!(event.severity, EventSeverity::Error);
        assert_eq!(event.code.as_deref(), Some("E42"));
    }

    #[test]
    fn test_severity_serde_lowercase() {
        let json = serde_json::to_string(&EventSeverity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        let parsed: EventSeverity = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(parsed, EventSeverity::Warning);
    }
}
