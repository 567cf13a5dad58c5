//! Scripted collaborators for tests.

use crate::activator::{OfferingCatalog, OfferingRecord};
use crate::backend::{DeploymentBackend, PlanProvider};
use crate::errors::ActivationError;
use crate::probe::{ConnectionInput, ConnectivityProbe, ConnectivityResult, TargetHost};
use crate::sequencer::{StepContext, StepDefinition, StepOutcome, StepUnit};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Behavior {
    Succeed,
    Fail(String),
    Error(String),
    Panic(String),
    FailBeforeAttempt { attempt: u32, error: String },
}

type Hook = Arc<dyn Fn() + Send + Sync>;

/// A step unit with a scripted outcome that records every call.
///
/// Clones share the call record, so a test can keep a clone after handing
/// the step to a sequencer.
#[derive(Clone)]
pub struct ScriptedStep {
    behavior: Behavior,
    logs: Vec<String>,
    detail: Option<String>,
    delay: Option<Duration>,
    hook: Option<Hook>,
    calls: Arc<Mutex<Vec<(Option<String>, u32)>>>,
}

impl ScriptedStep {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            logs: Vec::new(),
            detail: None,
            delay: None,
            hook: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A step that succeeds.
    #[must_use]
    pub fn succeed() -> Self {
        Self::with_behavior(Behavior::Succeed)
    }

    /// A step that reports a structured failure.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Fail(error.into()))
    }

    /// A step that returns `Err`.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Error(message.into()))
    }

    /// A step that panics.
    #[must_use]
    pub fn panic(message: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Panic(message.into()))
    }

    /// A step that fails until the stage reaches `attempt`, then succeeds.
    #[must_use]
    pub fn fail_before_attempt(attempt: u32, error: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::FailBeforeAttempt {
            attempt,
            error: error.into(),
        })
    }

    /// Log lines emitted before the outcome.
    #[must_use]
    pub fn with_logs<I, S>(mut self, logs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.logs = logs.into_iter().map(Into::into).collect();
        self
    }

    /// Detail string attached to the outcome.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Sleeps before producing the outcome.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Runs `hook` each time the step executes, after its logs.
    #[must_use]
    pub fn on_run(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Number of times the step executed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// `(host, attempt)` seen by each execution.
    #[must_use]
    pub fn contexts(&self) -> Vec<(Option<String>, u32)> {
        self.calls.lock().clone()
    }
}

impl std::fmt::Debug for ScriptedStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedStep")
            .field("behavior", &self.behavior)
            .field("logs", &self.logs.len())
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StepUnit for ScriptedStep {
    async fn execute(&self, ctx: &StepContext) -> anyhow::Result<StepOutcome> {
        self.calls
            .lock()
            .push((ctx.host().map(ToString::to_string), ctx.attempt()));

        for line in &self.logs {
            ctx.log(line.clone()).await;
        }
        if let Some(hook) = &self.hook {
            hook();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = match &self.behavior {
            Behavior::Succeed => StepOutcome::success(),
            Behavior::Fail(error) => StepOutcome::failure(error.clone()),
            Behavior::Error(message) => anyhow::bail!("{message}"),
            Behavior::Panic(message) => panic!("{message}"),
            Behavior::FailBeforeAttempt { attempt, error } => {
                if ctx.attempt() < *attempt {
                    StepOutcome::failure(error.clone())
                } else {
                    StepOutcome::success()
                }
            }
        };
        Ok(match &self.detail {
            Some(detail) => outcome.with_detail(detail.clone()),
            None => outcome,
        })
    }
}

/// A probe that replays queued results, then repeats a fallback.
#[derive(Debug)]
pub struct StaticProbe {
    queued: Mutex<VecDeque<ConnectivityResult>>,
    fallback: ConnectivityResult,
    calls: Mutex<usize>,
}

impl StaticProbe {
    /// A probe that always returns `result`.
    #[must_use]
    pub fn new(result: ConnectivityResult) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback: result,
            calls: Mutex::new(0),
        }
    }

    /// Queues a result returned before the fallback.
    #[must_use]
    pub fn then(self, result: ConnectivityResult) -> Self {
        self.queued.lock().push_back(result);
        self
    }

    /// Number of probe calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn probe(&self, _input: &ConnectionInput) -> ConnectivityResult {
        *self.calls.lock() += 1;
        let queued = self.queued.lock().pop_front();
        queued.unwrap_or_else(|| self.fallback.clone())
    }
}

/// A backend that succeeds with one log line per step unless scripted.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    scripts: HashMap<String, ScriptedStep>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    /// A backend where every step succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the step or test case `id`.
    #[must_use]
    pub fn with_script(mut self, id: impl Into<String>, step: ScriptedStep) -> Self {
        self.scripts.insert(id.into(), step);
        self
    }

    /// Step and test-case ids in execution order.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    async fn run(&self, id: &str, ctx: &StepContext) -> anyhow::Result<StepOutcome> {
        self.executed.lock().push(id.to_string());
        match self.scripts.get(id) {
            Some(script) => script.execute(ctx).await,
            None => {
                ctx.log(format!("{id}: ok")).await;
                Ok(StepOutcome::success())
            }
        }
    }
}

#[async_trait]
impl DeploymentBackend for ScriptedBackend {
    async fn deploy_step(&self, step_id: &str, ctx: &StepContext) -> anyhow::Result<StepOutcome> {
        self.run(step_id, ctx).await
    }

    async fn run_test_case(&self, case_id: &str, ctx: &StepContext) -> anyhow::Result<StepOutcome> {
        self.run(case_id, ctx).await
    }
}

/// Fixed step lists, ignoring the host.
#[derive(Debug, Clone)]
pub struct StaticPlans {
    deployment: Vec<StepDefinition>,
    testing: Vec<StepDefinition>,
}

impl StaticPlans {
    /// Creates plans from explicit step lists.
    #[must_use]
    pub fn new(deployment: Vec<StepDefinition>, testing: Vec<StepDefinition>) -> Self {
        Self {
            deployment,
            testing,
        }
    }
}

impl PlanProvider for StaticPlans {
    fn deployment_plan(&self, _host: &TargetHost) -> Vec<StepDefinition> {
        self.deployment.clone()
    }

    fn testing_plan(&self, _host: &TargetHost) -> Vec<StepDefinition> {
        self.testing.clone()
    }
}

/// A catalog that keeps records in memory.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    records: Mutex<Vec<OfferingRecord>>,
    reject: Mutex<Option<String>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the next persist call with `reason`.
    pub fn reject_next(&self, reason: impl Into<String>) {
        *self.reject.lock() = Some(reason.into());
    }

    /// Persisted records.
    #[must_use]
    pub fn records(&self) -> Vec<OfferingRecord> {
        self.records.lock().clone()
    }

    /// Number of persisted records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing was persisted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl OfferingCatalog for InMemoryCatalog {
    async fn persist(&self, record: &OfferingRecord) -> Result<(), ActivationError> {
        if let Some(reason) = self.reject.lock().take() {
            return Err(ActivationError::new(reason));
        }
        self.records.lock().push(record.clone());
        Ok(())
    }
}
