//! Error types for the provisioning pipeline.
//!
//! Domain failures that a caller is expected to render (unreachable host,
//! failed step) travel as structured results, not errors. What remains here
//! is input rejection, protocol/state misuse, activation failures and
//! programming errors.

use crate::core::{PipelineStage, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Coarse classification of a [`ProvisionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed connection input or invalid service configuration.
    Input,
    /// Operation invoked in the wrong stage, while busy, or on a gone session.
    State,
    /// The offering could not be activated.
    Activation,
    /// Programming or setup error.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::State => write!(f, "state"),
            Self::Activation => write!(f, "activation"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Input was rejected before any stage work began.
    #[error("{0}")]
    Input(#[from] InputError),

    /// The operation is not legal in the session's current state.
    #[error("{0}")]
    State(#[from] StateError),

    /// The offering could not be activated.
    #[error("{0}")]
    Activation(#[from] ActivationError),

    /// A step list was not a valid stage definition.
    #[error("{0}")]
    Sequencer(#[from] SequencerError),

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProvisionError {
    /// Returns the error classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Input(_) => ErrorKind::Input,
            Self::State(_) => ErrorKind::State,
            Self::Activation(_) => ErrorKind::Activation,
            Self::Sequencer(_) | Self::Config(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if resubmitting the same stage may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Activation(_))
    }

    /// Returns true if the caller drove the session incorrectly.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::State(_))
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map.insert("retryable".to_string(), serde_json::json!(self.is_retryable()));
        match self {
            Self::Input(err) => {
                map.insert("field".to_string(), serde_json::json!(err.field));
            }
            Self::State(err) => {
                map.insert("code".to_string(), serde_json::json!(err.code()));
            }
            _ => {}
        }
        map
    }
}

/// Error raised when caller input is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {field}: {message}")]
pub struct InputError {
    /// The offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl InputError {
    /// Creates a new input error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Protocol errors: an operation invoked at the wrong time.
///
/// These describe caller mistakes and never represent a retryable pipeline failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The session is not in the stage the operation requires.
    #[error("{operation} requires stage '{expected}' but session is in '{actual}'")]
    WrongStage {
        /// The attempted operation.
        operation: String,
        /// The stage the operation requires.
        expected: PipelineStage,
        /// The stage the session is in.
        actual: PipelineStage,
    },

    /// Another stage operation is already running.
    #[error("{operation} rejected: a stage operation is already running")]
    Busy {
        /// The attempted operation.
        operation: String,
    },

    /// A result the operation depends on is missing.
    #[error("{operation} requires {missing}")]
    PrerequisiteMissing {
        /// The attempted operation.
        operation: String,
        /// What is missing.
        missing: String,
    },

    /// The stage has used up its attempts.
    #[error("Stage '{stage}' exhausted its {attempts} attempts")]
    RetryLimitExceeded {
        /// The exhausted stage.
        stage: PipelineStage,
        /// Attempts made.
        attempts: u32,
    },

    /// The session already reached `Done`.
    #[error("Session is complete")]
    Completed,

    /// The session has been abandoned.
    #[error("Session was abandoned")]
    Abandoned,

    /// No session with this id exists.
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    /// The controller holds its maximum number of sessions.
    #[error("Session limit reached ({max})")]
    SessionLimit {
        /// Configured maximum.
        max: usize,
    },
}

impl StateError {
    /// A stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::WrongStage { .. } => "wrong_stage",
            Self::Busy { .. } => "busy",
            Self::PrerequisiteMissing { .. } => "prerequisite_missing",
            Self::RetryLimitExceeded { .. } => "retry_limit_exceeded",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
            Self::UnknownSession(_) => "unknown_session",
            Self::SessionLimit { .. } => "session_limit",
        }
    }
}

/// Error raised when the offering cannot be activated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Activation failed: {message}")]
pub struct ActivationError {
    /// Human-readable reason.
    pub message: String,
}

impl ActivationError {
    /// Creates a new activation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors in a step list handed to the sequencer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequencerError {
    /// The step list is empty.
    #[error("A stage requires at least one step")]
    EmptyPlan,

    /// Two steps share an id.
    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),
}

/// Errors loading pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration could not be parsed.
    #[error("Config parse error: {0}")]
    Parse(String),

    /// A configuration value is out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}
