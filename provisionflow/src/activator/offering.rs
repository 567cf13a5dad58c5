//! The sellable listing produced at the end of onboarding.

use super::ServiceConfig;
use crate::core::SessionId;
use crate::probe::{HostFacts, TargetHost};
use crate::utils::{generate_uuid_v7, now, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Host identity combined with its commercial configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferingRecord {
    /// Unique, time-ordered offering id.
    pub offering_id: Uuid,
    /// The onboarding session that produced it.
    pub session_id: SessionId,
    /// The provisioned host.
    pub host: TargetHost,
    /// Facts discovered when connecting.
    pub facts: HostFacts,
    /// Commercial configuration.
    pub config: ServiceConfig,
    /// When the record was produced.
    pub created_at: Timestamp,
}

impl OfferingRecord {
    /// Creates a record with a fresh id.
    #[must_use]
    pub fn new(session_id: SessionId, host: TargetHost, facts: HostFacts, config: ServiceConfig) -> Self {
        Self {
            offering_id: generate_uuid_v7(),
            session_id,
            host,
            facts,
            config,
            created_at: now(),
        }
    }
}
