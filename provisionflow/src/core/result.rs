//! Aggregate result of a deployment or testing stage.

use super::{ProgressEvent, StageKind, StageStatus, Step};
use crate::utils::{elapsed_ms, now, Timestamp};
use serde::{Deserialize, Serialize};

/// Ordered steps plus the overall outcome of one stage execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Which stage produced this result.
    pub kind: StageKind,
    /// Steps in declaration order.
    pub steps: Vec<Step>,
    /// Overall status.
    pub status: StageStatus,
    /// Stage-level error if the stage failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Attempt number of this execution (1-based).
    pub attempt: u32,
    /// When the stage started.
    pub started_at: Timestamp,
    /// When the stage finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
}

impl StageResult {
    /// Creates a running result with every step pending.
    #[must_use]
    pub fn running(kind: StageKind, steps: Vec<Step>, attempt: u32) -> Self {
        Self {
            kind,
            steps,
            status: StageStatus::Running,
            error: None,
            attempt,
            started_at: now(),
            ended_at: None,
        }
    }

    /// Looks up a step by id.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Returns the first failed step, if any.
    #[must_use]
    pub fn failed_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.status.is_failure())
    }

    /// Returns the number of steps that are still pending.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_pending()).count()
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Succeeded
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status == StageStatus::Failed
    }

    /// Returns true while steps are executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == StageStatus::Running
    }

    /// Applies a progress event to the matching step.
    ///
    /// Events for a different stage kind or an out-of-range index are ignored.
    pub fn apply_event(&mut self, event: &ProgressEvent) {
        if event.kind != self.kind {
            return;
        }
        if let Some(slot) = self.steps.get_mut(event.step_index) {
            *slot = event.step.clone();
        }
    }

    /// Marks the stage as failed with a stage-level error.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = StageStatus::Failed;
        self.error = Some(error.into());
        self.ended_at = Some(now());
    }

    /// Finalizes the overall status from the step statuses.
    ///
    /// Succeeded only if every step reached a success variant.
    pub fn finalize(&mut self) {
        if self.error.is_some() || self.steps.iter().any(|s| s.status.is_failure()) {
            self.status = StageStatus::Failed;
        } else if self.steps.iter().all(|s| s.status.is_success()) {
            self.status = StageStatus::Succeeded;
        } else {
            self.status = StageStatus::Failed;
            self.error = Some("stage ended with unfinished steps".to_string());
        }
        self.ended_at = Some(now());
    }

    /// Duration in milliseconds, once the stage has ended.
    #[must_use]
    pub fn duration_ms(&self) -> Option<f64> {
        self.ended_at.map(|end| elapsed_ms(self.started_at, end))
    }
}
