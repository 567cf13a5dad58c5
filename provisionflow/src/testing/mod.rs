//! Testing utilities for provisioning pipelines.
//!
//! This module provides:
//! - Scripted step units and collaborators
//! - Assertions over stage results

mod assertions;
mod mocks;

pub use assertions::{assert_stage_failed_at, assert_stage_succeeded};
pub use mocks::{InMemoryCatalog, ScriptedBackend, ScriptedStep, StaticPlans, StaticProbe};
