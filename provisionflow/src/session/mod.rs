//! The provisioning session state machine.
//!
//! A session holds everything known about one onboarding attempt and is
//! the only place stage transitions happen. It is a plain synchronous
//! value: the controller drives the asynchronous work and reports each
//! outcome back through the `complete_*` methods.

mod retry;
mod snapshot;

pub use retry::{BackoffStrategy, JitterStrategy, RetryConfig};
pub use snapshot::{SessionSnapshot, StageFailure};

use crate::activator::{OfferingRecord, ServiceConfig};
use crate::core::{PipelineStage, ProgressEvent, SessionId, StageKind, StageResult};
use crate::errors::StateError;
use crate::probe::{ConnectivityResult, TargetHost};
use crate::utils::{now, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// A caller operation that executes a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOperation {
    /// Probe the host and store its facts.
    SubmitConnection,
    /// Run the deployment steps.
    RunDeployment,
    /// Run the test cases.
    RunTesting,
    /// Validate and activate the commercial configuration.
    SubmitServiceConfig,
}

impl StageOperation {
    /// The stage the operation is legal in.
    #[must_use]
    pub fn stage(self) -> PipelineStage {
        match self {
            Self::SubmitConnection => PipelineStage::Connect,
            Self::RunDeployment => PipelineStage::Deploy,
            Self::RunTesting => PipelineStage::Test,
            Self::SubmitServiceConfig => PipelineStage::Configure,
        }
    }

    /// The step-based stage kind, for sequenced operations.
    #[must_use]
    pub fn kind(self) -> Option<StageKind> {
        match self {
            Self::RunDeployment => Some(StageKind::Deployment),
            Self::RunTesting => Some(StageKind::Testing),
            Self::SubmitConnection | Self::SubmitServiceConfig => None,
        }
    }

    /// Operation name used in errors and logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::SubmitConnection => "submit_connection",
            Self::RunDeployment => "run_deployment",
            Self::RunTesting => "run_testing",
            Self::SubmitServiceConfig => "submit_service_config",
        }
    }
}

impl fmt::Display for StageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The aggregate root of one onboarding attempt for one host.
///
/// Stages only advance forward. A failed stage leaves the session where
/// it was, allowing only a retry of that stage or abandonment. At most
/// one stage operation runs at a time.
#[derive(Debug, Clone)]
pub struct ProvisioningSession {
    id: SessionId,
    stage: PipelineStage,
    target: Option<TargetHost>,
    connectivity: Option<ConnectivityResult>,
    deployment: Option<StageResult>,
    testing: Option<StageResult>,
    config: Option<ServiceConfig>,
    offering: Option<OfferingRecord>,
    running: Option<StageOperation>,
    abandoned: bool,
    attempts: BTreeMap<PipelineStage, u32>,
    last_failure: Option<StageFailure>,
    retry: RetryConfig,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl ProvisioningSession {
    /// Creates a session in `Connect` with a fresh id.
    #[must_use]
    pub fn new(retry: RetryConfig) -> Self {
        Self::with_id(SessionId::new(), retry)
    }

    /// Creates a session in `Connect` with the given id.
    #[must_use]
    pub fn with_id(id: SessionId, retry: RetryConfig) -> Self {
        let created_at = now();
        Self {
            id,
            stage: PipelineStage::Connect,
            target: None,
            connectivity: None,
            deployment: None,
            testing: None,
            config: None,
            offering: None,
            running: None,
            abandoned: false,
            attempts: BTreeMap::new(),
            last_failure: None,
            retry,
            created_at,
            updated_at: created_at,
        }
    }

    /// The session id.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The current stage.
    #[must_use]
    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// The connected host, once connect succeeded.
    #[must_use]
    pub fn target(&self) -> Option<&TargetHost> {
        self.target.as_ref()
    }

    /// The latest connectivity result.
    #[must_use]
    pub fn connectivity(&self) -> Option<&ConnectivityResult> {
        self.connectivity.as_ref()
    }

    /// The latest deployment result.
    #[must_use]
    pub fn deployment(&self) -> Option<&StageResult> {
        self.deployment.as_ref()
    }

    /// The latest testing result.
    #[must_use]
    pub fn testing(&self) -> Option<&StageResult> {
        self.testing.as_ref()
    }

    /// The produced offering.
    #[must_use]
    pub fn offering(&self) -> Option<&OfferingRecord> {
        self.offering.as_ref()
    }

    /// The operation currently running, if any.
    #[must_use]
    pub fn running(&self) -> Option<StageOperation> {
        self.running
    }

    /// Returns true while a stage operation runs.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.running.is_some()
    }

    /// Returns true once the session was abandoned.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    /// Attempts made at `stage`.
    #[must_use]
    pub fn attempts(&self, stage: PipelineStage) -> u32 {
        self.attempts.get(&stage).copied().unwrap_or(0)
    }

    /// The current stage's latest failure.
    #[must_use]
    pub fn last_failure(&self) -> Option<&StageFailure> {
        self.last_failure.as_ref()
    }

    /// Checks that `op` may start now without changing the session.
    ///
    /// Returns the attempt number `op` would run as.
    pub fn check(&self, op: StageOperation) -> Result<u32, StateError> {
        if self.abandoned {
            return Err(StateError::Abandoned);
        }
        if self.stage.is_terminal() {
            return Err(StateError::Completed);
        }
        if self.running.is_some() {
            return Err(StateError::Busy {
                operation: op.name().to_string(),
            });
        }
        if self.stage != op.stage() {
            return Err(StateError::WrongStage {
                operation: op.name().to_string(),
                expected: op.stage(),
                actual: self.stage,
            });
        }
        if let Some(missing) = self.missing_prerequisite(op) {
            return Err(StateError::PrerequisiteMissing {
                operation: op.name().to_string(),
                missing: missing.to_string(),
            });
        }

        let made = self.attempts(self.stage);
        if !self.retry.allows_attempt(made) {
            return Err(StateError::RetryLimitExceeded {
                stage: self.stage,
                attempts: made,
            });
        }

        Ok(made + 1)
    }

    /// Checks that `op` may start now and marks the session busy.
    ///
    /// Returns the attempt number of this execution. Nothing changes if
    /// the operation is rejected.
    pub fn begin(&mut self, op: StageOperation) -> Result<u32, StateError> {
        let attempt = self.check(op)?;
        self.attempts.insert(self.stage, attempt);
        self.running = Some(op);
        self.touch();
        debug!(session_id = %self.id, operation = %op, attempt, "Stage operation started");
        Ok(attempt)
    }

    fn missing_prerequisite(&self, op: StageOperation) -> Option<&'static str> {
        match op {
            StageOperation::SubmitConnection => None,
            StageOperation::RunDeployment => {
                let connected = self.connectivity.as_ref().is_some_and(|c| c.success);
                (!connected || self.target.is_none()).then_some("a successful connectivity result")
            }
            StageOperation::RunTesting => {
                let deployed = self.deployment.as_ref().is_some_and(StageResult::is_success);
                (!deployed).then_some("a successful deployment")
            }
            StageOperation::SubmitServiceConfig => {
                let tested = self.testing.as_ref().is_some_and(StageResult::is_success);
                (!tested).then_some("a passed test suite")
            }
        }
    }

    /// Records the connectivity outcome and ends the connect operation.
    ///
    /// On success the host becomes the session's target and the session
    /// advances to `Deploy`.
    pub fn complete_connection(&mut self, result: ConnectivityResult, target: TargetHost) {
        self.running = None;
        if result.success {
            self.target = Some(target);
            self.connectivity = Some(result);
            self.advance();
        } else {
            let error = result
                .error
                .clone()
                .unwrap_or_else(|| "host unreachable".to_string());
            self.connectivity = Some(result);
            self.record_failure(error);
        }
        self.touch();
    }

    /// Installs the live result of a sequenced stage that is about to run.
    ///
    /// Replaces the previous result of that stage entirely.
    pub fn begin_stage_result(&mut self, result: StageResult) {
        let kind = result.kind;
        *self.result_slot(kind) = Some(result);
        self.touch();
    }

    /// Applies a progress event to the live result of its stage.
    pub fn apply_progress(&mut self, event: &ProgressEvent) {
        let applied = match self.result_slot(event.kind).as_mut() {
            Some(result) => {
                result.apply_event(event);
                true
            }
            None => false,
        };
        if applied {
            self.touch();
        }
    }

    /// Records the final result of a sequenced stage and ends the operation.
    pub fn complete_stage(&mut self, result: StageResult) {
        self.running = None;
        let succeeded = result.is_success() && result.kind.pipeline_stage() == self.stage;
        let error = result
            .error
            .clone()
            .unwrap_or_else(|| format!("{} failed", result.kind));
        let kind = result.kind;
        *self.result_slot(kind) = Some(result);

        if succeeded {
            self.advance();
        } else {
            self.record_failure(error);
        }
        self.touch();
    }

    /// Records a produced offering and completes the session.
    pub fn complete_activation(&mut self, config: ServiceConfig, record: OfferingRecord) {
        self.running = None;
        self.config = Some(config);
        self.offering = Some(record);
        self.advance();
        self.touch();
    }

    /// Records a rejected activation; the session stays in `Configure`.
    pub fn fail_activation(&mut self, config: ServiceConfig, error: impl Into<String>) {
        self.running = None;
        self.config = Some(config);
        self.record_failure(error.into());
        self.touch();
    }

    /// Ends a running operation that did not report an outcome.
    ///
    /// A live stage result left running is marked failed. Does nothing
    /// when the session is idle.
    pub fn release(&mut self) {
        let Some(op) = self.running.take() else {
            return;
        };
        if let Some(kind) = op.kind() {
            if let Some(result) = self.result_slot(kind).as_mut() {
                if result.is_running() {
                    result.fail("stage interrupted");
                }
            }
        }
        self.record_failure(format!("{op} interrupted"));
        self.touch();
    }

    /// Marks the session abandoned. Further stage operations are rejected.
    ///
    /// Returns true if a stage operation is still running.
    pub fn mark_abandoned(&mut self) -> bool {
        if !self.abandoned {
            self.abandoned = true;
            self.touch();
            info!(session_id = %self.id, stage = %self.stage, "Session abandoned");
        }
        self.running.is_some()
    }

    /// A copy of the session for callers.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let retry_after_ms = self
            .last_failure
            .as_ref()
            .filter(|f| f.retryable && !self.abandoned)
            .map(|f| {
                let delay = self.retry.advisory_delay(f.attempts);
                u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
            });

        SessionSnapshot {
            session_id: self.id,
            stage: self.stage,
            running: self.running,
            abandoned: self.abandoned,
            target: self.target.clone(),
            connectivity: self.connectivity.clone(),
            deployment: self.deployment.clone(),
            testing: self.testing.clone(),
            config: self.config.clone(),
            offering: self.offering.clone(),
            attempts: self.attempts.clone(),
            last_failure: self.last_failure.clone(),
            retry_after_ms,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn result_slot(&mut self, kind: StageKind) -> &mut Option<StageResult> {
        match kind {
            StageKind::Deployment => &mut self.deployment,
            StageKind::Testing => &mut self.testing,
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.stage.next() {
            info!(session_id = %self.id, from = %self.stage, to = %next, "Session advanced");
            self.stage = next;
        }
        self.last_failure = None;
    }

    fn record_failure(&mut self, error: String) {
        let attempts = self.attempts(self.stage);
        self.last_failure = Some(StageFailure {
            stage: self.stage,
            error,
            attempts,
            retryable: self.retry.allows_attempt(attempts),
        });
    }

    fn touch(&mut self) {
        self.updated_at = now();
    }
}
