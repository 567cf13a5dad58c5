//! Service activation: turning a validated host into an offering.

mod offering;
mod service_config;

pub use offering::OfferingRecord;
pub use service_config::{PlanTier, ServiceConfig};

use crate::core::{SessionId, StageResult};
use crate::errors::{ActivationError, ProvisionError};
use crate::probe::{HostFacts, TargetHost};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// External store that persists offering records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OfferingCatalog: Send + Sync {
    /// Persists `record`, or rejects it with a reason.
    async fn persist(&self, record: &OfferingRecord) -> Result<(), ActivationError>;
}

/// What the activator needs to know about the host being activated.
#[derive(Debug, Clone, Copy)]
pub struct ActivationTarget<'a> {
    /// The onboarding session.
    pub session_id: SessionId,
    /// The connected host.
    pub host: &'a TargetHost,
    /// Facts discovered when connecting.
    pub facts: &'a HostFacts,
    /// Latest deployment result.
    pub deployment: Option<&'a StageResult>,
    /// Latest testing result.
    pub testing: Option<&'a StageResult>,
}

/// Produces offering records and hands them to the catalog.
#[derive(Clone)]
pub struct ServiceActivator {
    catalog: Arc<dyn OfferingCatalog>,
}

impl ServiceActivator {
    /// Creates an activator over `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<dyn OfferingCatalog>) -> Self {
        Self { catalog }
    }

    /// Validates `config`, checks the host cleared deployment and testing,
    /// and persists the resulting offering.
    pub async fn activate(
        &self,
        target: ActivationTarget<'_>,
        config: ServiceConfig,
    ) -> Result<OfferingRecord, ProvisionError> {
        config.validate()?;

        if !target.deployment.is_some_and(StageResult::is_success) {
            return Err(ActivationError::new("host has not passed deployment").into());
        }
        if !target.testing.is_some_and(StageResult::is_success) {
            return Err(ActivationError::new("host has not passed testing").into());
        }

        let record = OfferingRecord::new(
            target.session_id,
            target.host.clone(),
            target.facts.clone(),
            config,
        );

        if let Err(e) = self.catalog.persist(&record).await {
            warn!(
                session_id = %target.session_id,
                host = %target.host,
                error = %e,
                "Catalog rejected offering"
            );
            return Err(e.into());
        }

        info!(
            session_id = %target.session_id,
            offering_id = %record.offering_id,
            host = %target.host,
            name = %record.config.name,
            "Offering activated"
        );
        Ok(record)
    }
}

impl std::fmt::Debug for ServiceActivator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceActivator").finish_non_exhaustive()
    }
}
