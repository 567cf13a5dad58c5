//! Step record shared by deployment steps and test cases.

use super::StepStatus;
use crate::utils::{elapsed_ms, now, Timestamp};
use serde::{Deserialize, Serialize};

/// One atomic, named unit of work within a deployment or testing stage.
///
/// Log lines are append-only and are accepted only once the step has
/// started running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Stable identifier (e.g. `install_packages`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Current status.
    pub status: StepStatus,
    /// Accumulated log lines.
    #[serde(default)]
    pub logs: Vec<String>,
    /// Optional detail string reported on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Error message if the step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the step started running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    /// When the step reached its terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
}

impl Step {
    /// Creates a pending step.
    #[must_use]
    pub fn pending(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: StepStatus::Pending,
            logs: Vec::new(),
            detail: None,
            error: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Marks the step as running.
    pub fn start(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(now());
    }

    /// Appends a log line.
    ///
    /// Returns false (and drops the line) if the step has not started yet.
    pub fn append_log(&mut self, line: impl Into<String>) -> bool {
        if self.status == StepStatus::Pending {
            return false;
        }
        self.logs.push(line.into());
        true
    }

    /// Records the terminal status of the step.
    pub fn finish(&mut self, status: StepStatus, detail: Option<String>, error: Option<String>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.detail = detail;
        self.error = error;
        self.ended_at = Some(now());
    }

    /// Duration of the step in milliseconds, once it has finished.
    #[must_use]
    pub fn duration_ms(&self) -> Option<f64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(elapsed_ms(start, end)),
            _ => None,
        }
    }

    /// Returns true if the step is pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == StepStatus::Pending
    }
}
