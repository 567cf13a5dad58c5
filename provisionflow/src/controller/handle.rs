//! Per-session state shared between the controller and running stages.

use crate::cancellation::AbandonToken;
use crate::core::ProgressEvent;
use crate::events::{ProgressSink, SinkError};
use crate::session::ProvisioningSession;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

/// A registered session plus the signals needed to drive it.
pub(super) struct SessionHandle {
    pub(super) session: Mutex<ProvisioningSession>,
    pub(super) token: AbandonToken,
    idle: Notify,
}

impl SessionHandle {
    pub(super) fn new(session: ProvisioningSession) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(session),
            token: AbandonToken::new(),
            idle: Notify::new(),
        })
    }

    /// Waits until no stage operation is running.
    pub(super) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            let busy = self.session.lock().is_busy();
            if !busy {
                return;
            }
            notified.await;
        }
    }
}

/// Clears the busy flag when a stage operation ends, however it ends.
///
/// If the operation already reported its outcome the release is a no-op.
/// If its future was dropped midway, the live result is marked interrupted.
pub(super) struct BusyGuard {
    handle: Arc<SessionHandle>,
}

impl BusyGuard {
    pub(super) fn new(handle: Arc<SessionHandle>) -> Self {
        Self { handle }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.handle.session.lock().release();
        self.handle.idle.notify_waiters();
    }
}

/// Tee sink: records each event on the live session, then forwards it.
pub(super) struct SessionRecorder {
    handle: Arc<SessionHandle>,
    inner: Arc<dyn ProgressSink>,
}

impl SessionRecorder {
    pub(super) fn new(handle: Arc<SessionHandle>, inner: Arc<dyn ProgressSink>) -> Self {
        Self { handle, inner }
    }
}

#[async_trait]
impl ProgressSink for SessionRecorder {
    async fn emit(&self, event: &ProgressEvent) -> Result<(), SinkError> {
        self.handle.session.lock().apply_progress(event);
        self.inner.emit(event).await
    }
}
