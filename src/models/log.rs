//! Log entry model - lifecycle events persisted by a log sink

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEvent {
    Started,
    Stopped,
    StartFailed,
    StopFailed,
    RolledBack,
}

impl std::fmt::Display for LogEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl LogEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEvent::Started => "started",
            LogEvent::Stopped => "stopped",
            LogEvent::StartFailed => "start_failed",
            LogEvent::StopFailed => "stop_failed",
            LogEvent::RolledBack => "rolled_back",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "started" => Some(LogEvent::Started),
            "stopped" => Some(LogEvent::Stopped),
            "start_failed" => Some(LogEvent::StartFailed),
            "stop_failed" => Some(LogEvent::StopFailed),
            "rolled_back" => Some(LogEvent::RolledBack),
            _ => None,
        }
    }
}

/// A single persisted event, keyed by application id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub app_id: u32,
    pub event: LogEvent,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(app_id: u32, event: LogEvent, message: impl Into<String>) -> Self {
        Self {
            app_id,
            event,
            message: message.into(),
            at: Utc::now(),
        }
    }
}
