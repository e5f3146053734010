//! Pricing table
//!
//! Deterministic per-minute pricing used both for the pre-flight budget
//! estimate and for finalizing the cost of a completed call. Explicit
//! per-prefix entries win by longest prefix match; destinations with no entry
//! fall back to the domestic or international flat rate.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Rate for one destination prefix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    /// E.164 prefix including the leading `+` (e.g. "+44", "+4477")
    pub prefix: String,

    /// Rate per minute
    pub rate_per_minute: Decimal,

    /// Human-readable destination name
    #[serde(default)]
    pub label: Option<String>,
}

/// Data-driven pricing table
#[derive(Debug, Clone, PartialEq)]
pub struct PricingTable {
    /// Sorted by prefix length, longest first
    entries: Vec<PriceEntry>,
    domestic_prefixes: Vec<String>,
    domestic_rate: Decimal,
    international_rate: Decimal,
    estimate_minutes: Decimal,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::flat(
            vec!["+1".to_string()],
            Decimal::new(13, 3),
            Decimal::new(10, 2),
            Decimal::ONE,
        )
    }
}

impl PricingTable {
    /// Domestic/international table with no per-prefix entries
    pub fn flat(
        domestic_prefixes: Vec<String>,
        domestic_rate: Decimal,
        international_rate: Decimal,
        estimate_minutes: Decimal,
    ) -> Self {
        Self {
            entries: Vec::new(),
            domestic_prefixes,
            domestic_rate,
            international_rate,
            estimate_minutes,
        }
    }

    /// Add explicit per-prefix rates
    pub fn with_entries(mut self, mut entries: Vec<PriceEntry>) -> Self {
        entries.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        self.entries = entries;
        self
    }

    pub fn entries(&self) -> &[PriceEntry] {
        &self.entries
    }

    /// Whether the destination matches a domestic prefix
    pub fn is_domestic(&self, destination: &str) -> bool {
        self.domestic_prefixes
            .iter()
            .any(|prefix| destination.starts_with(prefix.as_str()))
    }

    /// Per-minute rate for a destination
    pub fn rate_per_minute(&self, destination: &str) -> Decimal {
        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| destination.starts_with(e.prefix.as_str()))
        {
            return entry.rate_per_minute;
        }

        if self.is_domestic(destination) {
            self.domestic_rate
        } else {
            self.international_rate
        }
    }

    /// Pre-flight estimate: rate for the assumed call length
    pub fn estimate_cost(&self, destination: &str) -> Decimal {
        self.rate_per_minute(destination) * self.estimate_minutes
    }

    /// Final cost: `duration / 60 * rate`, rounded to 4 decimal places
    pub fn cost_for_duration(rate_per_minute: Decimal, duration_seconds: i32) -> Decimal {
        let seconds = Decimal::from(duration_seconds.max(0));
        (seconds / Decimal::from(60) * rate_per_minute).round_dp(4)
    }
}
