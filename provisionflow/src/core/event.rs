//! Progress events streamed to a progress sink.

use super::{StageKind, Step};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to the step carried by a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    /// The step was marked running.
    StepStarted,
    /// The step appended a log line.
    StepLog,
    /// The step reached its terminal status.
    StepFinished,
}

impl fmt::Display for ProgressEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StepStarted => write!(f, "step.started"),
            Self::StepLog => write!(f, "step.log"),
            Self::StepFinished => write!(f, "step.finished"),
        }
    }
}

/// A live update about one step.
///
/// Every event carries the complete accumulated state of the step,
/// including the full log so far, never a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Monotonic sequence number within one stage execution, starting at 0.
    pub sequence: u64,
    /// Which stage emitted the event.
    pub kind: StageKind,
    /// The event type.
    #[serde(rename = "type")]
    pub event_type: ProgressEventType,
    /// Position of the step in the stage's step list.
    pub step_index: usize,
    /// Snapshot of the step.
    pub step: Step,
    /// When the event was produced (ISO 8601).
    pub timestamp: String,
}

impl ProgressEvent {
    /// Creates a new progress event.
    #[must_use]
    pub fn new(
        sequence: u64,
        kind: StageKind,
        event_type: ProgressEventType,
        step_index: usize,
        step: Step,
    ) -> Self {
        Self {
            sequence,
            kind,
            event_type,
            step_index,
            step,
            timestamp: crate::utils::iso_timestamp(),
        }
    }

    /// The id of the step this event is about.
    #[must_use]
    pub fn step_id(&self) -> &str {
        &self.step.id
    }

    /// The most recent log line, if any.
    #[must_use]
    pub fn last_log(&self) -> Option<&str> {
        self.step.logs.last().map(String::as_str)
    }
}
