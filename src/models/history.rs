//! Wire model for the store's `history` topic.
//!
//! Records are append-only: once written they are never mutated, only
//! deleted by the retention sweep. Field names match what the dashboard
//! readers already consume (`pump_name` carries sensor entities too).

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

/// Kind of change a history event records. `Alarm` is reserved for a sensor
/// entering the critical state; pump attribute changes and sensor recovery
/// use the two change kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    StatusChange,
    ModeChange,
    Alarm,
}

/// Structured context attached to a history event, serialized as a bare
/// object to match the records already on the topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventDetails {
    LevelWithThreshold { level: f64, threshold: f64 },
    Level { level: f64 },
    Voltage { voltage: f64 },
    Pressure { pressure: f64 },
    Change { from: String, to: String },
}

/// One immutable record on the `history` topic.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEvent {
    /// Epoch milliseconds; the retention sweep orders and cuts on this.
    pub timestamp: i64,
    /// Local wall-clock rendering, display surfaces only.
    pub date_formatted: String,
    /// Display-cased entity name.
    pub pump_name: String,
    pub event_type: EventKind,
    pub message: String,
    pub details: EventDetails,
}

impl HistoryEvent {
    pub fn from_transition(transition: crate::tracker::Transition, now: DateTime<Utc>) -> Self {
        HistoryEvent {
            timestamp: now.timestamp_millis(),
            date_formatted: now
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            pump_name: transition.entity,
            event_type: transition.kind,
            message: transition.message,
            details: transition.details,
        }
    }
}
