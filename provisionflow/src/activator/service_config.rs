//! Commercial configuration of an offering.

use crate::errors::InputError;
use crate::probe::HostFacts;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Plan tier advertised in the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    /// Entry plan.
    Basic,
    /// Mid plan.
    #[default]
    Standard,
    /// Top plan.
    Premium,
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Standard => write!(f, "standard"),
            Self::Premium => write!(f, "premium"),
        }
    }
}

/// Pricing, limits and descriptive metadata for a sellable offering.
///
/// Feature tags are a set, so duplicates collapse on insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Display name.
    pub name: String,
    /// Country shown to buyers.
    #[serde(default)]
    pub country: Option<String>,
    /// City shown to buyers.
    #[serde(default)]
    pub city: Option<String>,
    /// Plan tier.
    #[serde(default)]
    pub tier: PlanTier,
    /// Monthly price.
    pub monthly_price: f64,
    /// Yearly price.
    pub yearly_price: f64,
    /// Maximum simultaneous connections.
    pub max_connections: u32,
    /// Bandwidth descriptor (e.g. "1 TB/month").
    #[serde(default)]
    pub bandwidth: Option<String>,
    /// Speed descriptor (e.g. "1 Gbps").
    #[serde(default)]
    pub speed: Option<String>,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Feature tags.
    #[serde(default)]
    pub features: BTreeSet<String>,
}

impl ServiceConfig {
    /// Creates a config with the required commercial fields.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        monthly_price: f64,
        yearly_price: f64,
        max_connections: u32,
    ) -> Self {
        Self {
            name: name.into(),
            monthly_price,
            yearly_price,
            max_connections,
            ..Self::default()
        }
    }

    /// A blank draft with location pre-filled from discovered host facts.
    ///
    /// Prices and limits are left at zero, so the draft does not validate
    /// until the seller fills them in.
    #[must_use]
    pub fn draft_from_facts(facts: &HostFacts) -> Self {
        Self {
            country: facts.country.clone(),
            city: facts.city.clone(),
            ..Self::default()
        }
    }

    /// Sets country and city.
    #[must_use]
    pub fn with_location(mut self, country: impl Into<String>, city: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self.city = Some(city.into());
        self
    }

    /// Sets the plan tier.
    #[must_use]
    pub fn with_tier(mut self, tier: PlanTier) -> Self {
        self.tier = tier;
        self
    }

    /// Sets the bandwidth descriptor.
    #[must_use]
    pub fn with_bandwidth(mut self, bandwidth: impl Into<String>) -> Self {
        self.bandwidth = Some(bandwidth.into());
        self
    }

    /// Sets the speed descriptor.
    #[must_use]
    pub fn with_speed(mut self, speed: impl Into<String>) -> Self {
        self.speed = Some(speed.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds a feature tag.
    #[must_use]
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.insert(feature.into());
        self
    }

    /// Checks the commercial invariants.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.name.trim().is_empty() {
            return Err(InputError::new("name", "must not be empty"));
        }
        check_price("monthly_price", self.monthly_price)?;
        check_price("yearly_price", self.yearly_price)?;
        if self.max_connections == 0 {
            return Err(InputError::new("max_connections", "must be positive"));
        }
        if self.features.iter().any(|f| f.trim().is_empty()) {
            return Err(InputError::new("features", "tags must not be blank"));
        }
        Ok(())
    }
}

fn check_price(field: &str, value: f64) -> Result<(), InputError> {
    if !value.is_finite() {
        return Err(InputError::new(field, "must be a finite number"));
    }
    if value <= 0.0 {
        return Err(InputError::new(field, "must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = ServiceConfig::new("Premium DE", 9.99, 99.99, 5)
            .with_tier(PlanTier::Premium)
            .with_location("Germany", "Frankfurt")
            .with_feature("no-logs")
            .with_feature("no-logs")
            .with_feature("p2p");
        assert!(config.validate().is_ok());
        assert_eq!(config.features.len(), 2);
    }

    #[test]
    fn test_zero_monthly_price_rejected() {
        let err = ServiceConfig::new("Basic", 0.0, 90.0, 10).validate().unwrap_err();
        assert_eq!(err.field, "monthly_price");
    }

    #[test]
    fn test_non_finite_price_rejected() {
        let err = ServiceConfig::new("Basic", 9.0, f64::NAN, 10).validate().unwrap_err();
        assert_eq!(err.field, "yearly_price");
    }

    #[test]
    fn test_zero_connections_rejected() {
        let err = ServiceConfig::new("Basic", 9.0, 90.0, 0).validate().unwrap_err();
        assert_eq!(err.field, "max_connections");
    }

    #[test]
    fn test_blank_name_rejected() {
        let err = ServiceConfig::new("  ", 9.0, 90.0, 1).validate().unwrap_err();
        assert_eq!(err.field, "name");
    }

    #[test]
    fn test_draft_from_facts() {
        let mut facts = HostFacts::new().with_region("Frankfurt");
        facts.country = Some("Germany".to_string());
        facts.city = Some("Frankfurt".to_string());

        let draft = ServiceConfig::draft_from_facts(&facts);
        assert_eq!(draft.country.as_deref(), Some("Germany"));
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_features_deserialize_as_set() {
        let config: ServiceConfig = serde_json::from_str(
            r#"{"name":"x","monthly_price":1,"yearly_price":10,"max_connections":1,"features":["a","a","b"]}"#,
        )
        .unwrap();
        assert_eq!(config.features.len(), 2);
        assert_eq!(config.tier, PlanTier::Standard);
    }
}
