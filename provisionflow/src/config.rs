//! Pipeline policy configuration.

use crate::errors::ConfigError;
use crate::session::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_deploy_step_timeout_ms() -> u64 {
    300_000
}

fn default_test_step_timeout_ms() -> u64 {
    60_000
}

fn default_probe_timeout_ms() -> u64 {
    30_000
}

fn default_max_sessions() -> usize {
    64
}

/// Policy values for a [`PipelineController`](crate::controller::PipelineController).
///
/// Every field has a default, so a partial JSON document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Stage retry limits and advisory backoff.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Timeout for each deployment step.
    #[serde(default = "default_deploy_step_timeout_ms")]
    pub deploy_step_timeout_ms: u64,
    /// Timeout for each test case.
    #[serde(default = "default_test_step_timeout_ms")]
    pub test_step_timeout_ms: u64,
    /// Timeout around the connectivity probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Maximum live sessions per controller.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            deploy_step_timeout_ms: default_deploy_step_timeout_ms(),
            test_step_timeout_ms: default_test_step_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl PipelineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Rejects values that would make the pipeline unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }
        for (name, value) in [
            ("deploy_step_timeout_ms", self.deploy_step_timeout_ms),
            ("test_step_timeout_ms", self.test_step_timeout_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::Invalid("max_sessions must be at least 1".into()));
        }
        Ok(())
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the deployment step timeout.
    #[must_use]
    pub fn with_deploy_step_timeout_ms(mut self, ms: u64) -> Self {
        self.deploy_step_timeout_ms = ms;
        self
    }

    /// Sets the test case timeout.
    #[must_use]
    pub fn with_test_step_timeout_ms(mut self, ms: u64) -> Self {
        self.test_step_timeout_ms = ms;
        self
    }

    /// Sets the probe timeout.
    #[must_use]
    pub fn with_probe_timeout_ms(mut self, ms: u64) -> Self {
        self.probe_timeout_ms = ms;
        self
    }

    /// Sets the session limit.
    #[must_use]
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Deployment step timeout as a duration.
    #[must_use]
    pub fn deploy_step_timeout(&self) -> Duration {
        Duration::from_millis(self.deploy_step_timeout_ms)
    }

    /// Test case timeout as a duration.
    #[must_use]
    pub fn test_step_timeout(&self) -> Duration {
        Duration::from_millis(self.test_step_timeout_ms)
    }

    /// Probe timeout as a duration.
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}
