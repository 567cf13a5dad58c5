//! Execution context handed to a running step.

use crate::core::{ProgressEvent, ProgressEventType, StageKind, Step};
use crate::events::{NoOpProgressSink, ProgressSink};
use crate::probe::TargetHost;
use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// What a unit of work sees while it runs: which step it is, which host
/// it targets, and a channel for incremental log lines.
pub struct StepContext {
    step_id: String,
    step_index: usize,
    kind: StageKind,
    attempt: u32,
    host: Option<TargetHost>,
    record: Arc<Mutex<Step>>,
    sink: Arc<dyn ProgressSink>,
    sequence: Arc<AtomicU64>,
}

impl StepContext {
    pub(crate) fn new(
        step_index: usize,
        kind: StageKind,
        attempt: u32,
        host: Option<TargetHost>,
        record: Arc<Mutex<Step>>,
        sink: Arc<dyn ProgressSink>,
        sequence: Arc<AtomicU64>,
    ) -> Self {
        let step_id = record.lock().id.clone();
        Self {
            step_id,
            step_index,
            kind,
            attempt,
            host,
            record,
            sink,
            sequence,
        }
    }

    /// A context that is not attached to any sequencer run.
    ///
    /// Useful for exercising a unit of work directly.
    #[must_use]
    pub fn detached(step_id: &str, kind: StageKind) -> Self {
        let mut step = Step::pending(step_id, step_id);
        step.start();
        Self::new(
            0,
            kind,
            1,
            None,
            Arc::new(Mutex::new(step)),
            Arc::new(NoOpProgressSink),
            Arc::new(AtomicU64::new(0)),
        )
    }

    /// Attaches a target host.
    #[must_use]
    pub fn with_host(mut self, host: TargetHost) -> Self {
        self.host = Some(host);
        self
    }

    /// The id of the running step.
    #[must_use]
    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    /// Which stage the step belongs to.
    #[must_use]
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// The stage attempt this step runs in (1-based).
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The host the stage targets.
    #[must_use]
    pub fn host(&self) -> Option<&TargetHost> {
        self.host.as_ref()
    }

    /// The log lines recorded so far.
    #[must_use]
    pub fn logs(&self) -> Vec<String> {
        self.record.lock().logs.clone()
    }

    /// Appends a log line and delivers a progress event carrying the full log.
    pub async fn log(&self, line: impl Into<String>) {
        let snapshot = {
            let mut step = self.record.lock();
            if !step.append_log(line) {
                return;
            }
            step.clone()
        };
        emit_progress(
            self.sink.as_ref(),
            &self.sequence,
            self.kind,
            ProgressEventType::StepLog,
            self.step_index,
            snapshot,
        )
        .await;
    }
}

impl std::fmt::Debug for StepContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepContext")
            .field("step_id", &self.step_id)
            .field("kind", &self.kind)
            .field("attempt", &self.attempt)
            .field("host", &self.host)
            .finish()
    }
}

/// Builds and delivers one progress event.
///
/// Delivery errors and sink panics are logged only; an observer never
/// changes the outcome of a step.
pub(crate) async fn emit_progress(
    sink: &dyn ProgressSink,
    sequence: &AtomicU64,
    kind: StageKind,
    event_type: ProgressEventType,
    step_index: usize,
    step: Step,
) {
    let event = ProgressEvent::new(
        sequence.fetch_add(1, Ordering::SeqCst),
        kind,
        event_type,
        step_index,
        step,
    );
    match AssertUnwindSafe(sink.emit(&event)).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(
            stage = %kind,
            step_id = %event.step.id,
            error = %e,
            "Progress sink rejected event"
        ),
        Err(payload) => warn!(
            stage = %kind,
            step_id = %event.step.id,
            panic = %super::panic_message(payload.as_ref()),
            "Progress sink panicked"
        ),
    }
}
