//! Region label to location lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Country and city metadata for a region label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Country name.
    pub country: String,
    /// City name.
    pub city: String,
}

impl Location {
    /// Creates a location.
    #[must_use]
    pub fn new(country: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            city: city.into(),
        }
    }
}

/// Maps provider region labels to location metadata.
///
/// Unknown regions return `None`, leaving location fields for manual entry.
pub trait RegionLookup: Send + Sync {
    /// Looks up a region label.
    fn locate(&self, region: &str) -> Option<Location>;
}

/// A fixed, case-insensitive region table.
#[derive(Debug, Clone)]
pub struct StaticRegionTable {
    entries: HashMap<String, Location>,
}

impl StaticRegionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Adds or replaces an entry.
    #[must_use]
    pub fn with_entry(mut self, region: &str, location: Location) -> Self {
        self.entries.insert(region.trim().to_lowercase(), location);
        self
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for StaticRegionTable {
    fn default() -> Self {
        Self::empty()
            .with_entry("Frankfurt", Location::new("Germany", "Frankfurt"))
            .with_entry("Amsterdam", Location::new("Netherlands", "Amsterdam"))
            .with_entry("London", Location::new("United Kingdom", "London"))
            .with_entry("New York", Location::new("United States", "New York"))
            .with_entry("Singapore", Location::new("Singapore", "Singapore"))
            .with_entry("Tokyo", Location::new("Japan", "Tokyo"))
    }
}

impl RegionLookup for StaticRegionTable {
    fn locate(&self, region: &str) -> Option<Location> {
        self.entries.get(&region.trim().to_lowercase()).cloned()
    }
}
