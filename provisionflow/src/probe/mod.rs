//! Connectivity probing.
//!
//! The probe verifies reachability and credentials of a target host and
//! reports host facts used to pre-fill the commercial configuration. The
//! remote mechanics live behind [`ConnectivityProbe`]; this module only
//! validates input, bounds the call with a timeout and enriches the result.

mod input;
mod region;

pub use input::{ConnectionInput, TargetHost};
pub use region::{Location, RegionLookup, StaticRegionTable};

use crate::errors::InputError;
use crate::observability::SpanTimer;
use crate::utils::{now, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Facts discovered about a reachable host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFacts {
    /// Operating system description (e.g. "Ubuntu 22.04").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_system: Option<String>,
    /// Provider region label (e.g. "Frankfurt").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Hosting provider label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Country, filled from the region when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// City, filled from the region when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl HostFacts {
    /// Creates empty host facts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the operating system.
    #[must_use]
    pub fn with_operating_system(mut self, os: impl Into<String>) -> Self {
        self.operating_system = Some(os.into());
        self
    }

    /// Sets the region label.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets the provider label.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Fills blank location fields from the region label.
    pub fn fill_location(&mut self, lookup: &dyn RegionLookup) {
        let Some(location) = self.region.as_deref().and_then(|r| lookup.locate(r)) else {
            return;
        };
        self.country.get_or_insert(location.country);
        self.city.get_or_insert(location.city);
    }
}

/// Outcome of a connectivity probe. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityResult {
    /// Whether the host is reachable with the given credentials.
    pub success: bool,
    /// Host facts, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facts: Option<HostFacts>,
    /// Human-readable reason, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// How long the probe took.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    /// When the probe finished.
    pub checked_at: Timestamp,
}

impl ConnectivityResult {
    /// A successful probe.
    #[must_use]
    pub fn reachable(facts: HostFacts) -> Self {
        Self {
            success: true,
            facts: Some(facts),
            error: None,
            latency_ms: None,
            checked_at: now(),
        }
    }

    /// A failed probe.
    #[must_use]
    pub fn unreachable(error: impl Into<String>) -> Self {
        Self {
            success: false,
            facts: None,
            error: Some(error.into()),
            latency_ms: None,
            checked_at: now(),
        }
    }

    /// Sets the measured latency.
    #[must_use]
    pub fn with_latency_ms(mut self, latency_ms: f64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Remote probe of a host's reachability and credentials.
///
/// Ordinary unreachability is reported as an unsuccessful
/// [`ConnectivityResult`], never as an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Probes the host described by `input`.
    async fn probe(&self, input: &ConnectionInput) -> ConnectivityResult;
}

/// Validates `input`, probes the host within `timeout` and fills location facts.
///
/// # Errors
///
/// Returns an [`InputError`] for malformed input, without contacting the probe.
pub async fn connect(
    probe: &dyn ConnectivityProbe,
    regions: &dyn RegionLookup,
    input: &ConnectionInput,
    timeout: Duration,
) -> Result<ConnectivityResult, InputError> {
    input.validate()?;

    let target = input.target();
    debug!(host = %target, "Probing host connectivity");
    let timer = SpanTimer::start("connectivity_probe");

    let result = match tokio::time::timeout(timeout, probe.probe(input)).await {
        Ok(result) => result,
        Err(_) => ConnectivityResult::unreachable(format!(
            "connectivity probe timed out after {}ms",
            timeout.as_millis()
        )),
    };
    let mut result = if result.latency_ms.is_some() {
        result
    } else {
        result.with_latency_ms(timer.finish())
    };

    if result.success {
        if let Some(facts) = result.facts.as_mut() {
            facts.fill_location(regions);
        }
        info!(host = %target, latency_ms = result.latency_ms, "Host reachable");
    } else {
        warn!(host = %target, error = result.error.as_deref(), "Host unreachable");
    }

    Ok(result)
}
