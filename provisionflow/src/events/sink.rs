//! Progress sink trait and implementations.

use crate::core::ProgressEvent;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, Level};

/// Error returned when an event could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Progress delivery failed: {message}")]
pub struct SinkError {
    /// Why delivery failed.
    pub message: String,
}

impl SinkError {
    /// Creates a new sink error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Trait for observers of live step progress.
///
/// The sequencer awaits each delivery before continuing, so events reach
/// the sink in exactly the order they were produced.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Delivers one progress event.
    async fn emit(&self, event: &ProgressEvent) -> Result<(), SinkError>;
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgressSink;

#[async_trait]
impl ProgressSink for NoOpProgressSink {
    async fn emit(&self, _event: &ProgressEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// A sink that logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingProgressSink {
    level: Level,
}

impl Default for LoggingProgressSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingProgressSink {
    /// Creates a new logging sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &ProgressEvent) {
        if self.level == Level::DEBUG {
            debug!(
                event_type = %event.event_type,
                stage = %event.kind,
                step_id = %event.step.id,
                status = %event.step.status,
                line = event.last_log(),
                "Progress: {}", event.event_type
            );
        } else {
            info!(
                event_type = %event.event_type,
                stage = %event.kind,
                step_id = %event.step.id,
                status = %event.step.status,
                line = event.last_log(),
                "Progress: {}", event.event_type
            );
        }
    }
}

#[async_trait]
impl ProgressSink for LoggingProgressSink {
    async fn emit(&self, event: &ProgressEvent) -> Result<(), SinkError> {
        self.log_event(event);
        Ok(())
    }
}

/// A sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingProgressSink {
    events: RwLock<Vec<ProgressEvent>>,
}

impl CollectingProgressSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns the events about one step.
    #[must_use]
    pub fn events_for_step(&self, step_id: &str) -> Vec<ProgressEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.step.id == step_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ProgressSink for CollectingProgressSink {
    async fn emit(&self, event: &ProgressEvent) -> Result<(), SinkError> {
        self.events.write().push(event.clone());
        Ok(())
    }
}

/// Delivers each event to several sinks in order.
///
/// Every sink receives the event even if an earlier one fails; the first
/// failure is reported.
#[derive(Default, Clone)]
pub struct FanoutProgressSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanoutProgressSink {
    /// Creates an empty fan-out sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a downstream sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Returns the number of downstream sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns true if there are no downstream sinks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for FanoutProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutProgressSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[async_trait]
impl ProgressSink for FanoutProgressSink {
    async fn emit(&self, event: &ProgressEvent) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(event).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
