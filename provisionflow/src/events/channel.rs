//! Channel-backed progress sink.

use super::{ProgressSink, SinkError};
use crate::core::ProgressEvent;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Forwards events into an unbounded tokio channel.
///
/// Lets any transport (HTTP streaming, websockets, a message queue) drain
/// the receiver while preserving event order. A dropped receiver turns
/// into a delivery error, which the sequencer logs and ignores.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressSink {
    /// Creates a sink and the receiver draining it.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Wraps an existing sender.
    #[must_use]
    pub fn from_sender(sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl ProgressSink for ChannelProgressSink {
    async fn emit(&self, event: &ProgressEvent) -> Result<(), SinkError> {
        self.sender
            .send(event.clone())
            .map_err(|_| SinkError::new("progress receiver dropped"))
    }
}
