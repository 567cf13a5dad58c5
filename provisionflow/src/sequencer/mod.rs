//! Ordered step execution shared by the deployment and testing stages.
//!
//! The sequencer runs a step list strictly in declaration order, streams
//! progress for every start, log line and finish, and stops at the first
//! failed step. Deployment and testing differ only in their step lists and
//! the success variant their steps report.

mod context;
mod step;

pub use context::StepContext;
pub use step::{FnStep, StepDefinition, StepOutcome, StepUnit};

use crate::cancellation::AbandonToken;
use crate::core::{ProgressEventType, StageKind, StageResult, Step, StepStatus};
use crate::errors::SequencerError;
use crate::events::ProgressSink;
use crate::observability::SpanTimer;
use crate::probe::TargetHost;
use context::emit_progress;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs a list of step definitions and aggregates a [`StageResult`].
#[derive(Debug, Clone)]
pub struct StepSequencer {
    kind: StageKind,
    attempt: u32,
    host: Option<TargetHost>,
    abandon: Option<AbandonToken>,
}

impl StepSequencer {
    /// Creates a sequencer for the given stage kind.
    #[must_use]
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            attempt: 1,
            host: None,
            abandon: None,
        }
    }

    /// Sets the attempt number recorded on the result.
    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Sets the host handed to each step context.
    #[must_use]
    pub fn with_host(mut self, host: TargetHost) -> Self {
        self.host = Some(host);
        self
    }

    /// Sets the token checked between steps.
    #[must_use]
    pub fn with_abandon_token(mut self, token: AbandonToken) -> Self {
        self.abandon = Some(token);
        self
    }

    /// Returns the stage kind.
    #[must_use]
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Runs `steps` in order, delivering progress to `sink`.
    ///
    /// Emits one event when a step starts, one per log line and one when
    /// it finishes. Stops at the first failed step; remaining steps stay
    /// pending and the failing step's error becomes the stage error.
    ///
    /// # Errors
    ///
    /// Returns a [`SequencerError`] if the step list is empty or contains
    /// duplicate ids. No step runs in that case.
    pub async fn run(
        &self,
        steps: &[StepDefinition],
        sink: Arc<dyn ProgressSink>,
    ) -> Result<StageResult, SequencerError> {
        validate_plan(steps)?;

        let pending = steps
            .iter()
            .map(|def| Step::pending(def.id(), def.name()))
            .collect();
        let mut result = StageResult::running(self.kind, pending, self.attempt);
        let sequence = Arc::new(AtomicU64::new(0));
        let timer = SpanTimer::start(self.kind.to_string());

        info!(
            stage = %self.kind,
            steps = steps.len(),
            attempt = self.attempt,
            "Stage started"
        );

        for (index, definition) in steps.iter().enumerate() {
            if self.abandon.as_ref().is_some_and(AbandonToken::is_abandoned) {
                info!(stage = %self.kind, step_id = %definition.id(), "Stage abandoned before step");
                result.fail("abandoned");
                break;
            }

            let record = Arc::new(Mutex::new(result.steps[index].clone()));
            let started = {
                let mut step = record.lock();
                step.start();
                step.clone()
            };
            debug!(stage = %self.kind, step_id = %definition.id(), "Step started");
            emit_progress(
                sink.as_ref(),
                &sequence,
                self.kind,
                ProgressEventType::StepStarted,
                index,
                started,
            )
            .await;

            let ctx = StepContext::new(
                index,
                self.kind,
                self.attempt,
                self.host.clone(),
                record.clone(),
                sink.clone(),
                sequence.clone(),
            );
            let outcome = execute_unit(definition, &ctx).await;

            let finished = {
                let mut step = record.lock();
                if outcome.success {
                    step.finish(self.kind.success_status(), outcome.detail, None);
                } else {
                    let error = outcome
                        .error
                        .unwrap_or_else(|| format!("Step '{}' failed", definition.name()));
                    step.finish(StepStatus::Failed, outcome.detail, Some(error));
                }
                step.clone()
            };
            result.steps[index] = finished.clone();

            let failed = finished.status.is_failure();
            let error = finished.error.clone();
            debug!(
                stage = %self.kind,
                step_id = %definition.id(),
                status = %finished.status,
                duration_ms = finished.duration_ms(),
                "Step finished"
            );
            emit_progress(
                sink.as_ref(),
                &sequence,
                self.kind,
                ProgressEventType::StepFinished,
                index,
                finished,
            )
            .await;

            if failed {
                let error = error.unwrap_or_else(|| format!("Step '{}' failed", definition.name()));
                warn!(
                    stage = %self.kind,
                    step_id = %definition.id(),
                    error = %error,
                    "Step failed, stopping stage"
                );
                result.fail(error);
                break;
            }
        }

        if result.is_running() {
            result.finalize();
        }

        info!(
            stage = %self.kind,
            status = %result.status,
            duration_ms = timer.finish(),
            "Stage finished"
        );
        Ok(result)
    }
}

/// Rejects empty plans and plans with duplicate step ids.
pub(crate) fn validate_plan(steps: &[StepDefinition]) -> Result<(), SequencerError> {
    if steps.is_empty() {
        return Err(SequencerError::EmptyPlan);
    }
    let mut seen = HashSet::new();
    for def in steps {
        if !seen.insert(def.id()) {
            return Err(SequencerError::DuplicateStep(def.id().to_string()));
        }
    }
    Ok(())
}

/// Runs one unit of work, folding faults, panics and timeouts into a failed outcome.
async fn execute_unit(definition: &StepDefinition, ctx: &StepContext) -> StepOutcome {
    let guarded = AssertUnwindSafe(definition.unit().execute(ctx)).catch_unwind();
    let joined = match definition.timeout() {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(joined) => joined,
            Err(_) => {
                return StepOutcome::failure(format!(
                    "step timed out after {}ms",
                    limit.as_millis()
                ))
            }
        },
        None => guarded.await,
    };

    match joined {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => StepOutcome::failure(format!("{err:#}")),
        Err(payload) => StepOutcome::failure(format!("step panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageStatus;
    use crate::events::{CollectingProgressSink, NoOpProgressSink};
    use crate::testing::ScriptedStep;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn plan(units: Vec<(&str, ScriptedStep)>) -> Vec<StepDefinition> {
        units
            .into_iter()
            .map(|(id, unit)| StepDefinition::new(id, format!("Step {id}"), Arc::new(unit)))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_plan_rejected() {
        let sequencer = StepSequencer::new(StageKind::Deployment);
        let err = sequencer.run(&[], Arc::new(NoOpProgressSink)).await.unwrap_err();
        assert_eq!(err, SequencerError::EmptyPlan);
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected() {
        let steps = plan(vec![("a", ScriptedStep::succeed()), ("a", ScriptedStep::succeed())]);
        let err = StepSequencer::new(StageKind::Deployment)
            .run(&steps, Arc::new(NoOpProgressSink))
            .await
            .unwrap_err();
        assert_eq!(err, SequencerError::DuplicateStep("a".to_string()));
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let steps = plan(vec![
            ("a", ScriptedStep::succeed().with_logs(["one", "two"])),
            ("b", ScriptedStep::succeed()),
            ("c", ScriptedStep::succeed().with_logs(["three"])),
        ]);
        let sink = Arc::new(CollectingProgressSink::new());
        let result = StepSequencer::new(StageKind::Deployment)
            .run(&steps, sink.clone())
            .await
            .unwrap();

        assert_eq!(result.status, StageStatus::Succeeded);
        assert!(result.steps.iter().all(|s| s.status == StepStatus::Completed));
        // start + finish per step, plus one per log line
        assert_eq!(sink.len(), 3 + 3 + 3);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_testing_steps_report_passed() {
        let steps = plan(vec![("connectivity", ScriptedStep::succeed())]);
        let result = StepSequencer::new(StageKind::Testing)
            .run(&steps, Arc::new(NoOpProgressSink))
            .await
            .unwrap();
        assert_eq!(result.steps[0].status, StepStatus::Passed);
    }

    #[tokio::test]
    async fn test_stops_on_first_failure() {
        let first = ScriptedStep::succeed();
        let third = ScriptedStep::succeed();
        let steps = plan(vec![
            ("a", first.clone()),
            ("b", ScriptedStep::fail("package not found")),
            ("c", third.clone()),
        ]);

        for _ in 0..2 {
            let result = StepSequencer::new(StageKind::Deployment)
                .run(&steps, Arc::new(NoOpProgressSink))
                .await
                .unwrap();

            assert_eq!(result.status, StageStatus::Failed);
            assert_eq!(result.steps[0].status, StepStatus::Completed);
            assert_eq!(result.steps[1].status, StepStatus::Failed);
            assert_eq!(result.steps[2].status, StepStatus::Pending);
            assert_eq!(result.error.as_deref(), Some("package not found"));
        }
        assert_eq!(first.calls(), 2);
        assert_eq!(third.calls(), 0);
    }

    #[tokio::test]
    async fn test_fault_is_a_step_failure() {
        let steps = plan(vec![
            ("a", ScriptedStep::error("ssh channel closed")),
            ("b", ScriptedStep::succeed()),
        ]);
        let result = StepSequencer::new(StageKind::Deployment)
            .run(&steps, Arc::new(NoOpProgressSink))
            .await
            .unwrap();

        assert!(result.is_failure());
        assert_eq!(result.steps[0].error.as_deref(), Some("ssh channel closed"));
        assert!(result.steps[1].is_pending());
    }

    #[tokio::test]
    async fn test_panic_is_a_step_failure() {
        let steps = plan(vec![("a", ScriptedStep::panic("index out of bounds"))]);
        let result = StepSequencer::new(StageKind::Testing)
            .run(&steps, Arc::new(NoOpProgressSink))
            .await
            .unwrap();

        assert!(result.is_failure());
        assert_eq!(
            result.error.as_deref(),
            Some("step panicked: index out of bounds")
        );
    }

    #[tokio::test]
    async fn test_step_timeout() {
        let steps = vec![StepDefinition::new(
            "slow",
            "Slow step",
            Arc::new(ScriptedStep::succeed().with_delay(Duration::from_secs(30))),
        )
        .with_timeout(Duration::from_millis(20))];

        let result = StepSequencer::new(StageKind::Deployment)
            .run(&steps, Arc::new(NoOpProgressSink))
            .await
            .unwrap();

        assert!(result.is_failure());
        assert_eq!(result.error.as_deref(), Some("step timed out after 20ms"));
    }

    #[tokio::test]
    async fn test_event_order() {
        let steps = plan(vec![
            ("a", ScriptedStep::succeed().with_logs(["a1"])),
            ("b", ScriptedStep::fail("bad").with_logs(["b1", "b2"])),
        ]);
        let sink = Arc::new(CollectingProgressSink::new());
        StepSequencer::new(StageKind::Deployment)
            .run(&steps, sink.clone())
            .await
            .unwrap();

        let trace: Vec<(String, ProgressEventType, usize)> = sink
            .events()
            .iter()
            .map(|e| (e.step.id.clone(), e.event_type, e.step.logs.len()))
            .collect();
        assert_eq!(
            trace,
            vec![
                ("a".to_string(), ProgressEventType::StepStarted, 0),
                ("a".to_string(), ProgressEventType::StepLog, 1),
                ("a".to_string(), ProgressEventType::StepFinished, 1),
                ("b".to_string(), ProgressEventType::StepStarted, 0),
                ("b".to_string(), ProgressEventType::StepLog, 1),
                ("b".to_string(), ProgressEventType::StepLog, 2),
                ("b".to_string(), ProgressEventType::StepFinished, 2),
            ]
        );
        let sequences: Vec<u64> = sink.events().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, (0..7).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_abandoned_token_stops_between_steps() {
        let token = AbandonToken::new();
        let trigger = token.clone();
        let first = ScriptedStep::succeed().on_run(move || {
            trigger.abandon("seller left");
        });
        let second = ScriptedStep::succeed();
        let steps = plan(vec![("a", first), ("b", second.clone())]);

        let result = StepSequencer::new(StageKind::Deployment)
            .with_abandon_token(token)
            .run(&steps, Arc::new(NoOpProgressSink))
            .await
            .unwrap();

        assert_eq!(result.steps[0].status, StepStatus::Completed);
        assert!(result.steps[1].is_pending());
        assert_eq!(result.error.as_deref(), Some("abandoned"));
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_abort() {
        let (sink, rx) = crate::events::ChannelProgressSink::new();
        drop(rx);
        let steps = plan(vec![("a", ScriptedStep::succeed().with_logs(["x"]))]);
        let result = StepSequencer::new(StageKind::Deployment)
            .run(&steps, Arc::new(sink))
            .await
            .unwrap();
        assert!(result.is_success());
    }

    struct PanickingSink {
        on: ProgressEventType,
    }

    #[async_trait::async_trait]
    impl ProgressSink for PanickingSink {
        async fn emit(&self, event: &crate::core::ProgressEvent) -> Result<(), crate::events::SinkError> {
            if event.event_type == self.on {
                panic!("renderer crashed");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_panic_does_not_abort() {
        for on in [
            ProgressEventType::StepStarted,
            ProgressEventType::StepLog,
            ProgressEventType::StepFinished,
        ] {
            let second = ScriptedStep::succeed();
            let steps = plan(vec![
                ("a", ScriptedStep::succeed().with_logs(["line"])),
                ("b", second.clone()),
            ]);
            let result = StepSequencer::new(StageKind::Deployment)
                .run(&steps, Arc::new(PanickingSink { on }))
                .await
                .unwrap();

            assert!(result.is_success(), "sink panicking on {on:?} aborted the stage");
            assert!(result.steps.iter().all(|s| s.status == StepStatus::Completed));
            assert_eq!(result.steps[0].logs, vec!["line".to_string()]);
            assert_eq!(second.calls(), 1);
        }
    }

    #[tokio::test]
    async fn test_host_and_attempt_reach_steps() {
        let unit = ScriptedStep::succeed();
        let steps = plan(vec![("a", unit.clone())]);
        StepSequencer::new(StageKind::Testing)
            .with_host(TargetHost::new("203.0.113.5", 22))
            .with_attempt(2)
            .run(&steps, Arc::new(NoOpProgressSink))
            .await
            .unwrap();

        let seen = unit.contexts();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_deref(), Some("203.0.113.5:22"));
        assert_eq!(seen[0].1, 2);
    }
}
