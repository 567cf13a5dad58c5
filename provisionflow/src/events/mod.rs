//! Progress sink system.
//!
//! A progress sink is the observer through which a caller (a UI, a CLI,
//! an automation) receives live step updates. Sinks are best-effort: a
//! delivery error is logged by the sequencer and never aborts a stage.

mod channel;
mod sink;

pub use channel::ChannelProgressSink;
pub use sink::{
    CollectingProgressSink, FanoutProgressSink, LoggingProgressSink, NoOpProgressSink,
    ProgressSink, SinkError,
};

use std::sync::Arc;

/// Returns a shared no-op sink, for callers that do not observe progress.
#[must_use]
pub fn noop_sink() -> Arc<dyn ProgressSink> {
    Arc::new(NoOpProgressSink)
}
