//! Read-only views of a provisioning session.

use super::StageOperation;
use crate::activator::{OfferingRecord, ServiceConfig};
use crate::core::{PipelineStage, SessionId, StageResult};
use crate::probe::{ConnectivityResult, TargetHost};
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The most recent failure of the current stage, with its retry affordance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// The stage that failed.
    pub stage: PipelineStage,
    /// Human-readable reason.
    pub error: String,
    /// Attempts made at this stage so far.
    pub attempts: u32,
    /// Whether another attempt is allowed.
    pub retryable: bool,
}

/// A point-in-time copy of a session, safe to hand to any caller.
///
/// While a stage runs, its result reflects every progress event
/// delivered so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session id.
    pub session_id: SessionId,
    /// Current stage.
    pub stage: PipelineStage,
    /// The operation in progress, if any.
    pub running: Option<StageOperation>,
    /// Whether the session has been abandoned.
    pub abandoned: bool,
    /// The connected host.
    pub target: Option<TargetHost>,
    /// Latest connectivity result.
    pub connectivity: Option<ConnectivityResult>,
    /// Latest deployment result.
    pub deployment: Option<StageResult>,
    /// Latest testing result.
    pub testing: Option<StageResult>,
    /// Last submitted service configuration.
    pub config: Option<ServiceConfig>,
    /// The produced offering, once done.
    pub offering: Option<OfferingRecord>,
    /// Attempts per stage.
    pub attempts: BTreeMap<PipelineStage, u32>,
    /// The current stage's latest failure.
    pub last_failure: Option<StageFailure>,
    /// Advisory wait before retrying the failed stage.
    pub retry_after_ms: Option<u64>,
    /// When the session was created.
    pub created_at: Timestamp,
    /// When the session last changed.
    pub updated_at: Timestamp,
}

impl SessionSnapshot {
    /// Returns true while a stage operation runs.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.running.is_some()
    }

    /// Returns true once the offering was produced.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.stage.is_terminal()
    }

    /// The step-based result belonging to the current stage, if any.
    #[must_use]
    pub fn current_result(&self) -> Option<&StageResult> {
        match self.stage {
            PipelineStage::Deploy => self.deployment.as_ref(),
            PipelineStage::Test => self.testing.as_ref(),
            _ => None,
        }
    }

    /// Attempts made at `stage`.
    #[must_use]
    pub fn attempts_for(&self, stage: PipelineStage) -> u32 {
        self.attempts.get(&stage).copied().unwrap_or(0)
    }
}
