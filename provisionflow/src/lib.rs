//! # Provisionflow
//!
//! The server-onboarding pipeline of a VPN marketplace: the workflow a
//! seller runs to turn a bare remote machine into a sellable offering.
//!
//! Onboarding moves a session through four stages:
//!
//! - **Connect**: probe reachability and credentials, collect host facts
//! - **Deploy**: run the deployment steps, streaming live progress
//! - **Test**: run the validation test cases the same way
//! - **Configure**: validate the commercial configuration and activate the offering
//!
//! Failed stages stay where they are and can be retried from their first
//! step. Remote execution, persistence and presentation are collaborators
//! behind traits.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use provisionflow::prelude::*;
//!
//! let controller = PipelineController::new(probe, backend, catalog);
//! let id = controller.begin_session()?;
//!
//! controller.submit_connection(id, ConnectionInput::new("203.0.113.5", secret)).await?;
//! controller.run_deployment(id, Arc::new(LoggingProgressSink::default())).await?;
//! controller.run_testing(id, Arc::new(LoggingProgressSink::default())).await?;
//!
//! let offering = controller
//!     .submit_service_config(id, ServiceConfig::new("Premium DE", 9.0, 90.0, 10))
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod activator;
pub mod backend;
pub mod cancellation;
pub mod config;
pub mod controller;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod probe;
pub mod sequencer;
pub mod session;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::activator::{
        OfferingCatalog, OfferingRecord, PlanTier, ServiceActivator, ServiceConfig,
    };
    pub use crate::backend::{BackendPlans, DeploymentBackend, PlanProvider};
    pub use crate::cancellation::AbandonToken;
    pub use crate::config::PipelineConfig;
    pub use crate::controller::{ConnectionReport, PipelineController};
    pub use crate::core::{
        PipelineStage, ProgressEvent, ProgressEventType, SessionId, StageKind, StageResult,
        StageStatus, Step, StepStatus,
    };
    pub use crate::errors::{
        ActivationError, ErrorKind, InputError, ProvisionError, SequencerError, StateError,
    };
    pub use crate::events::{
        ChannelProgressSink, CollectingProgressSink, LoggingProgressSink, NoOpProgressSink,
        ProgressSink,
    };
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::probe::{
        ConnectionInput, ConnectivityProbe, ConnectivityResult, HostFacts, RegionLookup,
        StaticRegionTable, TargetHost,
    };
    pub use crate::sequencer::{StepContext, StepDefinition, StepOutcome, StepSequencer, StepUnit};
    pub use crate::session::{RetryConfig, SessionSnapshot};
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
}
