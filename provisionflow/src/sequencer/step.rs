//! Step definitions and the unit-of-work trait.

use super::StepContext;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Terminal outcome reported by a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Whether the step succeeded.
    pub success: bool,
    /// Optional detail shown next to the step.
    pub detail: Option<String>,
    /// Error message for a failed step.
    pub error: Option<String>,
}

impl StepOutcome {
    /// A successful outcome.
    #[must_use]
    pub fn success() -> Self {
        Self {
            success: true,
            detail: None,
            error: None,
        }
    }

    /// A successful outcome with a detail string.
    #[must_use]
    pub fn success_with_detail(detail: impl Into<String>) -> Self {
        Self::success().with_detail(detail)
    }

    /// A failed outcome.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: None,
            error: Some(error.into()),
        }
    }

    /// Sets the detail string.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// An executable unit of work behind one step.
///
/// Returning `Err` (or panicking) is treated exactly like a structured
/// failure: the step fails with the fault's message.
#[async_trait]
pub trait StepUnit: Send + Sync + Debug {
    /// Executes the step, streaming log lines through `ctx`.
    async fn execute(&self, ctx: &StepContext) -> anyhow::Result<StepOutcome>;
}

/// A synchronous closure-based unit of work.
pub struct FnStep<F>
where
    F: Fn() -> anyhow::Result<StepOutcome> + Send + Sync,
{
    label: String,
    func: F,
}

impl<F> FnStep<F>
where
    F: Fn() -> anyhow::Result<StepOutcome> + Send + Sync,
{
    /// Creates a new closure-based unit.
    pub fn new(label: impl Into<String>, func: F) -> Self {
        Self {
            label: label.into(),
            func,
        }
    }
}

impl<F> Debug for FnStep<F>
where
    F: Fn() -> anyhow::Result<StepOutcome> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("label", &self.label).finish()
    }
}

#[async_trait]
impl<F> StepUnit for FnStep<F>
where
    F: Fn() -> anyhow::Result<StepOutcome> + Send + Sync,
{
    async fn execute(&self, _ctx: &StepContext) -> anyhow::Result<StepOutcome> {
        (self.func)()
    }
}

/// A named step plus the unit of work that runs it.
///
/// The timeout belongs to the step, not to the sequencer: each unit
/// carries its own execution policy.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    id: String,
    name: String,
    unit: Arc<dyn StepUnit>,
    timeout: Option<Duration>,
}

impl StepDefinition {
    /// Creates a step definition without a timeout.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, unit: Arc<dyn StepUnit>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            unit,
            timeout: None,
        }
    }

    /// Sets the step timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The step id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The step timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The unit of work.
    #[must_use]
    pub fn unit(&self) -> &Arc<dyn StepUnit> {
        &self.unit
    }
}
