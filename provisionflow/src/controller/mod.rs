//! The pipeline façade callers drive.
//!
//! [`PipelineController`] owns a registry of provisioning sessions and
//! forwards each stage operation to the right collaborator: the probe for
//! connect, the sequencer for deployment and testing, the activator for
//! configure. Every outcome is written back into the session, which is the
//! single source of truth a caller can snapshot at any time.

mod handle;
mod integration_tests;

use crate::activator::{ActivationTarget, OfferingCatalog, OfferingRecord, ServiceActivator, ServiceConfig};
use crate::backend::{BackendPlans, DeploymentBackend, PlanProvider};
use crate::config::PipelineConfig;
use crate::core::{PipelineStage, SessionId, StageResult, Step};
use crate::errors::{ProvisionError, StateError};
use crate::events::ProgressSink;
use crate::probe::{self, ConnectionInput, ConnectivityProbe, ConnectivityResult, RegionLookup, StaticRegionTable};
use crate::sequencer::{validate_plan, StepSequencer};
use crate::session::{ProvisioningSession, SessionSnapshot, StageOperation};
use dashmap::DashMap;
use handle::{BusyGuard, SessionHandle, SessionRecorder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

/// Outcome of a connect submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionReport {
    /// The probe result.
    pub result: ConnectivityResult,
    /// The session stage after the submission.
    pub stage: PipelineStage,
}

/// Coordinates provisioning sessions and their collaborators.
pub struct PipelineController {
    probe: Arc<dyn ConnectivityProbe>,
    backend: Arc<dyn DeploymentBackend>,
    plans: Option<Arc<dyn PlanProvider>>,
    activator: ServiceActivator,
    regions: Arc<dyn RegionLookup>,
    config: PipelineConfig,
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
}

impl PipelineController {
    /// Creates a controller with the default configuration, the fixed
    /// deployment and test plans, and the built-in region table.
    pub fn new(
        probe: Arc<dyn ConnectivityProbe>,
        backend: Arc<dyn DeploymentBackend>,
        catalog: Arc<dyn OfferingCatalog>,
    ) -> Self {
        Self {
            probe,
            backend,
            plans: None,
            activator: ServiceActivator::new(catalog),
            regions: Arc::new(StaticRegionTable::default()),
            config: PipelineConfig::default(),
            sessions: DashMap::new(),
        }
    }

    /// Sets the policy configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the region lookup used to pre-fill location facts.
    #[must_use]
    pub fn with_region_lookup(mut self, regions: Arc<dyn RegionLookup>) -> Self {
        self.regions = regions;
        self
    }

    /// Replaces the deployment and test plans.
    #[must_use]
    pub fn with_plans(mut self, plans: Arc<dyn PlanProvider>) -> Self {
        self.plans = Some(plans);
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Ids of all live sessions.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    /// Starts onboarding a new host.
    pub fn begin_session(&self) -> Result<SessionId, StateError> {
        let max = self.config.max_sessions;
        if self.sessions.len() >= max {
            warn!(max, "Session limit reached");
            return Err(StateError::SessionLimit { max });
        }
        let session = ProvisioningSession::new(self.config.retry.clone());
        let id = session.id();
        self.sessions.insert(id, SessionHandle::new(session));
        info!(session_id = %id, "Session started");
        Ok(id)
    }

    /// Probes the host in `input` and advances to `Deploy` on success.
    ///
    /// Malformed input is rejected before the probe is contacted and
    /// leaves the session untouched. The input is dropped when the call
    /// returns; the session keeps only the target host.
    pub async fn submit_connection(
        &self,
        id: SessionId,
        input: ConnectionInput,
    ) -> Result<ConnectionReport, ProvisionError> {
        let handle = self.handle(id)?;
        input.validate()?;
        handle.session.lock().begin(StageOperation::SubmitConnection)?;
        let _guard = BusyGuard::new(handle.clone());

        let span = info_span!("submit_connection", session_id = %id);
        let result = probe::connect(
            self.probe.as_ref(),
            self.regions.as_ref(),
            &input,
            self.config.probe_timeout(),
        )
        .instrument(span)
        .await?;

        let stage = {
            let mut session = handle.session.lock();
            session.complete_connection(result.clone(), input.target());
            session.stage()
        };
        Ok(ConnectionReport { result, stage })
    }

    /// Runs the deployment steps, streaming progress to `sink`.
    ///
    /// A failed deployment leaves the session in `Deploy`; calling again
    /// re-runs every step from the first.
    pub async fn run_deployment(
        &self,
        id: SessionId,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<StageResult, ProvisionError> {
        self.run_stage(id, StageOperation::RunDeployment, sink).await
    }

    /// Runs the test cases, streaming progress to `sink`.
    pub async fn run_testing(
        &self,
        id: SessionId,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<StageResult, ProvisionError> {
        self.run_stage(id, StageOperation::RunTesting, sink).await
    }

    async fn run_stage(
        &self,
        id: SessionId,
        op: StageOperation,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<StageResult, ProvisionError> {
        let Some(kind) = op.kind() else {
            return Err(ProvisionError::Internal(format!("{op} is not a sequenced stage")));
        };
        let handle = self.handle(id)?;
        let host = {
            let session = handle.session.lock();
            session.check(op)?;
            session.target().cloned()
        };
        // A malformed plan is rejected before an attempt is spent.
        let steps = match &host {
            Some(host) => {
                let plans = self.plans();
                let steps = match op {
                    StageOperation::RunTesting => plans.testing_plan(host),
                    _ => plans.deployment_plan(host),
                };
                validate_plan(&steps)?;
                steps
            }
            None => Vec::new(),
        };
        let attempt = handle.session.lock().begin(op)?;
        let _guard = BusyGuard::new(handle.clone());
        let host = host.ok_or_else(|| ProvisionError::Internal("session has no target host".into()))?;

        let pending = steps
            .iter()
            .map(|def| Step::pending(def.id(), def.name()))
            .collect();
        handle
            .session
            .lock()
            .begin_stage_result(StageResult::running(kind, pending, attempt));

        let recorder: Arc<dyn ProgressSink> = Arc::new(SessionRecorder::new(handle.clone(), sink));
        let sequencer = StepSequencer::new(kind)
            .with_attempt(attempt)
            .with_host(host)
            .with_abandon_token(handle.token.clone());

        let span = info_span!("run_stage", session_id = %id, stage = %kind, attempt);
        let result = sequencer.run(&steps, recorder).instrument(span).await?;

        handle.session.lock().complete_stage(result.clone());
        Ok(result)
    }

    /// Validates `config` and activates the offering.
    ///
    /// Invalid configuration is rejected before any work and leaves the
    /// session untouched. A rejected activation keeps the session in
    /// `Configure` with deployment and testing results intact.
    pub async fn submit_service_config(
        &self,
        id: SessionId,
        config: ServiceConfig,
    ) -> Result<OfferingRecord, ProvisionError> {
        let handle = self.handle(id)?;
        config.validate()?;

        let (host, facts, deployment, testing) = {
            let mut session = handle.session.lock();
            session.begin(StageOperation::SubmitServiceConfig)?;
            (
                session.target().cloned(),
                session
                    .connectivity()
                    .and_then(|c| c.facts.clone())
                    .unwrap_or_default(),
                session.deployment().cloned(),
                session.testing().cloned(),
            )
        };
        let _guard = BusyGuard::new(handle.clone());
        let host = host.ok_or_else(|| ProvisionError::Internal("session has no target host".into()))?;

        let target = ActivationTarget {
            session_id: id,
            host: &host,
            facts: &facts,
            deployment: deployment.as_ref(),
            testing: testing.as_ref(),
        };
        let span = info_span!("submit_service_config", session_id = %id);
        let outcome = self
            .activator
            .activate(target, config.clone())
            .instrument(span)
            .await;

        let mut session = handle.session.lock();
        match outcome {
            Ok(record) => {
                session.complete_activation(config, record.clone());
                Ok(record)
            }
            Err(e) => {
                session.fail_activation(config, e.to_string());
                Err(e)
            }
        }
    }

    /// A read-only copy of the session, including live progress of a
    /// running stage.
    pub fn snapshot(&self, id: SessionId) -> Result<SessionSnapshot, StateError> {
        Ok(self.handle(id)?.session.lock().snapshot())
    }

    /// A service configuration draft with location pre-filled from the
    /// connected host's facts.
    pub fn suggested_config(&self, id: SessionId) -> Result<ServiceConfig, StateError> {
        let handle = self.handle(id)?;
        let draft = {
            let session = handle.session.lock();
            session
                .connectivity()
                .filter(|c| c.success)
                .and_then(|c| c.facts.as_ref())
                .map(ServiceConfig::draft_from_facts)
        };
        draft.ok_or_else(|| StateError::PrerequisiteMissing {
            operation: "suggested_config".to_string(),
            missing: "a successful connectivity result".to_string(),
        })
    }

    /// Abandons a session and discards it.
    ///
    /// A running step is allowed to reach its terminal status first; the
    /// remaining steps are never started. Returns the final snapshot.
    pub async fn abandon(
        &self,
        id: SessionId,
        reason: impl Into<String>,
    ) -> Result<SessionSnapshot, StateError> {
        let handle = self.handle(id)?;
        let reason = reason.into();
        let running = {
            let mut session = handle.session.lock();
            if session.stage().is_terminal() {
                return Err(StateError::Completed);
            }
            session.mark_abandoned()
        };
        handle.token.abandon(reason.clone());

        if running {
            info!(session_id = %id, reason = %reason, "Waiting for running step before abandoning");
            handle.wait_idle().await;
        }

        self.sessions.remove(&id);
        info!(session_id = %id, reason = %reason, "Session discarded");
        let snapshot = handle.session.lock().snapshot();
        Ok(snapshot)
    }

    /// Removes a completed session, returning its final snapshot.
    pub fn close(&self, id: SessionId) -> Result<SessionSnapshot, StateError> {
        let handle = self.handle(id)?;
        let snapshot = handle.session.lock().snapshot();
        if !snapshot.is_done() {
            return Err(StateError::WrongStage {
                operation: "close".to_string(),
                expected: PipelineStage::Done,
                actual: snapshot.stage,
            });
        }
        self.sessions.remove(&id);
        info!(session_id = %id, "Session closed");
        Ok(snapshot)
    }

    fn handle(&self, id: SessionId) -> Result<Arc<SessionHandle>, StateError> {
        self.sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(StateError::UnknownSession(id))
    }

    fn plans(&self) -> Arc<dyn PlanProvider> {
        match &self.plans {
            Some(plans) => plans.clone(),
            None => Arc::new(BackendPlans::from_config(self.backend.clone(), &self.config)),
        }
    }
}

impl std::fmt::Debug for PipelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineController")
            .field("config", &self.config)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}
