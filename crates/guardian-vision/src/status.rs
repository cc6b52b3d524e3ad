use chrono::{DateTime, Utc};
use guardian_core::Source;
use serde::Serialize;

/// Operational events about the scheduler itself. These never go through
/// the announcement queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    BindingDisabled {
        source: Source,
        failures: u32,
        last_error: String,
        at: DateTime<Utc>,
    },
    BindingEnabled {
        source: Source,
        at: DateTime<Utc>,
    },
    UnitAbandoned {
        source: Source,
        at: DateTime<Utc>,
    },
    SchedulerStopped {
        joined: usize,
        abandoned: usize,
        at: DateTime<Utc>,
    },
}

impl StatusEvent {
    pub fn source(&self) -> Option<Source> {
        match self {
            StatusEvent::BindingDisabled { source, .. }
            | StatusEvent::BindingEnabled { source, .. }
            | StatusEvent::UnitAbandoned { source, .. } => Some(*source),
            StatusEvent::SchedulerStopped { .. } => None,
        }
    }
}
