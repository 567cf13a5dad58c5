//! Fixed deployment plan and test suite.

use super::DeploymentBackend;
use crate::config::PipelineConfig;
use crate::core::StageKind;
use crate::probe::TargetHost;
use crate::sequencer::{StepContext, StepDefinition, StepOutcome, StepUnit};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Deployment steps as `(id, name)`, in execution order.
pub const DEPLOYMENT_STEPS: [(&str, &str); 3] = [
    ("install_packages", "Install VPN packages"),
    ("configure_server", "Configure VPN server"),
    ("start_service", "Start VPN service"),
];

/// Test cases as `(id, name)`, in execution order.
pub const TEST_CASES: [(&str, &str); 4] = [
    ("connectivity", "Connectivity check"),
    ("handshake", "Tunnel handshake"),
    ("dns_resolution", "DNS resolution"),
    ("throughput", "Throughput test"),
];

/// Supplies the step list for each sequenced stage.
pub trait PlanProvider: Send + Sync {
    /// Steps for the deployment stage on `host`.
    fn deployment_plan(&self, host: &TargetHost) -> Vec<StepDefinition>;

    /// Test cases for the testing stage on `host`.
    fn testing_plan(&self, host: &TargetHost) -> Vec<StepDefinition>;
}

/// A step unit that forwards to a [`DeploymentBackend`].
pub struct BackendStep {
    id: String,
    kind: StageKind,
    backend: Arc<dyn DeploymentBackend>,
}

impl BackendStep {
    /// Creates a unit forwarding step `id` of the given stage kind.
    pub fn new(id: impl Into<String>, kind: StageKind, backend: Arc<dyn DeploymentBackend>) -> Self {
        Self {
            id: id.into(),
            kind,
            backend,
        }
    }
}

impl std::fmt::Debug for BackendStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendStep")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StepUnit for BackendStep {
    async fn execute(&self, ctx: &StepContext) -> anyhow::Result<StepOutcome> {
        match self.kind {
            StageKind::Deployment => self.backend.deploy_step(&self.id, ctx).await,
            StageKind::Testing => self.backend.run_test_case(&self.id, ctx).await,
        }
    }
}

/// The default plans: the fixed step lists backed by one backend.
#[derive(Clone)]
pub struct BackendPlans {
    backend: Arc<dyn DeploymentBackend>,
    deploy_timeout: Option<Duration>,
    test_timeout: Option<Duration>,
}

impl BackendPlans {
    /// Creates plans without step timeouts.
    #[must_use]
    pub fn new(backend: Arc<dyn DeploymentBackend>) -> Self {
        Self {
            backend,
            deploy_timeout: None,
            test_timeout: None,
        }
    }

    /// Creates plans using the step timeouts from `config`.
    #[must_use]
    pub fn from_config(backend: Arc<dyn DeploymentBackend>, config: &PipelineConfig) -> Self {
        Self::new(backend).with_timeouts(config.deploy_step_timeout(), config.test_step_timeout())
    }

    /// Sets the per-step timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, deploy: Duration, test: Duration) -> Self {
        self.deploy_timeout = Some(deploy);
        self.test_timeout = Some(test);
        self
    }

    fn build(
        &self,
        kind: StageKind,
        entries: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Vec<StepDefinition> {
        entries
            .iter()
            .map(|(id, name)| {
                let unit = Arc::new(BackendStep::new(*id, kind, self.backend.clone()));
                let def = StepDefinition::new(*id, *name, unit);
                match timeout {
                    Some(limit) => def.with_timeout(limit),
                    None => def,
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for BackendPlans {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendPlans")
            .field("deploy_timeout", &self.deploy_timeout)
            .field("test_timeout", &self.test_timeout)
            .finish_non_exhaustive()
    }
}

impl PlanProvider for BackendPlans {
    fn deployment_plan(&self, _host: &TargetHost) -> Vec<StepDefinition> {
        self.build(StageKind::Deployment, &DEPLOYMENT_STEPS, self.deploy_timeout)
    }

    fn testing_plan(&self, _host: &TargetHost) -> Vec<StepDefinition> {
        self.build(StageKind::Testing, &TEST_CASES, self.test_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockDeploymentBackend;
    use crate::core::StepStatus;
    use crate::events::NoOpProgressSink;
    use crate::sequencer::StepSequencer;

    fn host() -> TargetHost {
        TargetHost::new("203.0.113.5", 22)
    }

    #[test]
    fn test_default_plans_match_fixed_lists() {
        let plans = BackendPlans::new(Arc::new(MockDeploymentBackend::new()));

        let deploy: Vec<(String, String)> = plans
            .deployment_plan(&host())
            .iter()
            .map(|d| (d.id().to_string(), d.name().to_string()))
            .collect();
        assert_eq!(deploy.len(), 3);
        assert_eq!(deploy[0], ("install_packages".to_string(), "Install VPN packages".to_string()));

        let ids: Vec<String> = plans
            .testing_plan(&host())
            .iter()
            .map(|d| d.id().to_string())
            .collect();
        assert_eq!(ids, vec!["connectivity", "handshake", "dns_resolution", "throughput"]);
    }

    #[test]
    fn test_timeouts_from_config() {
        let config = PipelineConfig::default();
        let plans = BackendPlans::from_config(Arc::new(MockDeploymentBackend::new()), &config);

        let deploy = plans.deployment_plan(&host());
        assert!(deploy
            .iter()
            .all(|d| d.timeout() == Some(Duration::from_millis(300_000))));
        let tests = plans.testing_plan(&host());
        assert!(tests.iter().all(|d| d.timeout() == Some(Duration::from_millis(60_000))));
    }

    #[tokio::test]
    async fn test_deployment_forwards_to_backend() {
        let mut backend = MockDeploymentBackend::new();
        backend
            .expect_deploy_step()
            .times(3)
            .returning(|_, _| Ok(StepOutcome::success()));
        backend.expect_run_test_case().never();

        let plans = BackendPlans::new(Arc::new(backend));
        let result = StepSequencer::new(StageKind::Deployment)
            .run(&plans.deployment_plan(&host()), Arc::new(NoOpProgressSink))
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.steps[2].id, "start_service");
    }

    #[tokio::test]
    async fn test_backend_error_fails_test_case() {
        let mut backend = MockDeploymentBackend::new();
        backend
            .expect_run_test_case()
            .returning(|case_id, _| {
                if case_id == "handshake" {
                    Err(anyhow::anyhow!("no handshake within 5s"))
                } else {
                    Ok(StepOutcome::success())
                }
            });

        let plans = BackendPlans::new(Arc::new(backend));
        let result = StepSequencer::new(StageKind::Testing)
            .run(&plans.testing_plan(&host()), Arc::new(NoOpProgressSink))
            .await
            .unwrap();

        assert!(result.is_failure());
        assert_eq!(result.steps[0].status, StepStatus::Passed);
        assert_eq!(result.steps[1].status, StepStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("no handshake within 5s"));
        assert_eq!(result.pending_count(), 2);
    }
}
