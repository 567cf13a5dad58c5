//! Core domain model types.
//!
//! This module contains the types shared by every part of the pipeline:
//! - Stage and step status enums
//! - The step record and the aggregate stage result
//! - Progress events
//! - Session identifiers

mod event;
mod result;
mod session_id;
mod status;
mod step;

pub use event::{ProgressEvent, ProgressEventType};
pub use result::StageResult;
pub use session_id::SessionId;
pub use status::{PipelineStage, StageKind, StageStatus, StepStatus};
pub use step::Step;
