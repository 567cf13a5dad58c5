//! Deployment and test backend boundary.
//!
//! The pipeline never executes remote commands itself. Each deployment
//! step and test case is forwarded to a [`DeploymentBackend`], and a
//! [`PlanProvider`] decides which steps make up each stage.

mod plans;

pub use plans::{BackendPlans, BackendStep, PlanProvider, DEPLOYMENT_STEPS, TEST_CASES};

use crate::sequencer::{StepContext, StepOutcome};
use async_trait::async_trait;

/// Executes deployment steps and test cases against a remote host.
///
/// Implementations stream log lines through [`StepContext::log`] and
/// report a structured outcome. Returning `Err` fails the step with the
/// error message.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeploymentBackend: Send + Sync {
    /// Runs one deployment step on the host in `ctx`.
    async fn deploy_step(&self, step_id: &str, ctx: &StepContext) -> anyhow::Result<StepOutcome>;

    /// Runs one test case against the host in `ctx`.
    async fn run_test_case(&self, case_id: &str, ctx: &StepContext) -> anyhow::Result<StepOutcome>;
}
