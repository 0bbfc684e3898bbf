//! Cache entry with per-entry time-to-live

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A single cached response
///
/// An entry is valid iff `now < created_at + ttl_seconds`. Expired entries
/// are treated as absent by the cache and lazily evicted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Category the entry was stored under (used for predicate clears)
    pub category: String,
    /// Opaque serialized response
    pub value: serde_json::Value,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
    /// Time-to-live, supplied by the caller
    pub ttl_seconds: u64,
    /// Attributable cost of the original call, for savings reporting
    #[serde(default)]
    pub cost_estimate: f64,
}

impl CacheEntry {
    /// Create an entry timestamped now
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        value: serde_json::Value,
        ttl_seconds: u64,
        cost_estimate: f64,
    ) -> Self {
        Self {
            category: category.into(),
            value,
            created_at: Utc::now(),
            ttl_seconds,
            cost_estimate,
        }
    }

    /// Check validity against an explicit clock
    #[inline]
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        let ttl = Duration::seconds(i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX));
        now < self.created_at + ttl
    }

    /// Check validity against the wall clock
    #[inline]
    #[must_use]
    pub fn is_expired(&self) -> bool {
        !self.is_valid_at(Utc::now())
    }

    /// Approximate in-memory size of the stored value
    #[must_use]
    pub fn approx_size_bytes(&self) -> u64 {
        serde_json::to_string(&self.value)
            .map(|s| s.len() as u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with_ttl(ttl_seconds: u64) -> CacheEntry {
        CacheEntry::new("company", serde_json::json!({"k": "v"}), ttl_seconds, 0.0)
    }

    #[test]
    fn valid_just_inside_ttl() {
        let entry = entry_with_ttl(60);
        let at = entry.created_at + Duration::seconds(59);
        assert!(entry.is_valid_at(at));
    }

    #[test]
    fn expired_just_past_ttl() {
        let entry = entry_with_ttl(60);
        let at = entry.created_at + Duration::seconds(61);
        assert!(!entry.is_valid_at(at));
    }

    #[test]
    fn expired_exactly_at_ttl() {
        // Validity is strict: now must be before created_at + ttl.
        let entry = entry_with_ttl(60);
        let at = entry.created_at + Duration::seconds(60);
        assert!(!entry.is_valid_at(at));
    }

    #[test]
    fn zero_ttl_is_immediately_expired() {
        let entry = entry_with_ttl(0);
        assert!(entry.is_expired());
    }

    #[test]
    fn missing_cost_defaults_to_zero() {
        let json = r#"{
            "category": "company",
            "value": {"k": "v"},
            "created_at": "2026-01-01T00:00:00Z",
            "ttl_seconds": 60
        }"#;
        let entry: CacheEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.cost_estimate, 0.0);
    }
}
