//! Status and stage enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The onboarding stage a provisioning session is in.
///
/// Stages only advance forward: `Connect -> Deploy -> Test -> Configure -> Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Verify reachability and credentials of the target host.
    Connect,
    /// Install and configure the VPN software.
    Deploy,
    /// Run the validation test cases.
    Test,
    /// Submit the commercial configuration.
    Configure,
    /// Terminal state, the offering has been produced.
    Done,
}

impl Default for PipelineStage {
    fn default() -> Self {
        Self::Connect
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Deploy => write!(f, "deploy"),
            Self::Test => write!(f, "test"),
            Self::Configure => write!(f, "configure"),
            Self::Done => write!(f, "done"),
        }
    }
}

impl PipelineStage {
    /// Returns the stage that follows this one, or `None` for `Done`.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Connect => Some(Self::Deploy),
            Self::Deploy => Some(Self::Test),
            Self::Test => Some(Self::Configure),
            Self::Configure => Some(Self::Done),
            Self::Done => None,
        }
    }

    /// Returns true for the terminal stage.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Which step-based stage a step list belongs to.
///
/// Both kinds run through the same sequencer; they differ only in the
/// success variant reported for their steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Deployment steps (install, configure, start).
    Deployment,
    /// Test cases run against a deployed host.
    Testing,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployment => write!(f, "deployment"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

impl StageKind {
    /// The success status a step of this kind terminates with.
    #[must_use]
    pub fn success_status(self) -> StepStatus {
        match self {
            Self::Deployment => StepStatus::Completed,
            Self::Testing => StepStatus::Passed,
        }
    }

    /// The pipeline stage this kind runs in.
    #[must_use]
    pub fn pipeline_stage(self) -> PipelineStage {
        match self {
            Self::Deployment => PipelineStage::Deploy,
            Self::Testing => PipelineStage::Test,
        }
    }
}

/// The execution status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not started yet.
    Pending,
    /// Currently executing.
    Running,
    /// Deployment step finished successfully.
    Completed,
    /// Test case finished successfully.
    Passed,
    /// Step failed.
    Failed,
}

impl Default for StepStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl StepStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Passed | Self::Failed)
    }

    /// Returns true if the status is a success variant.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Completed | Self::Passed)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// The overall status of a deployment or testing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Steps are still executing.
    Running,
    /// Every step reached a success variant.
    Succeeded,
    /// A step failed or a stage-level error occurred.
    Failed,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Running
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
