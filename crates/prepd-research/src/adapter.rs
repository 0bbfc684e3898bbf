//! Cached wrapper around upstream research calls
//!
//! Only successful results are cached; a provider failure is re-raised
//! unchanged so the next call with the same fingerprint tries upstream
//! again. A cache value that no longer decodes is treated as a miss, not an
//! error.

use crate::provider::{Category, Finding, ProviderError, ResearchProvider};
use prepd_cache::{ExpiringCache, Fingerprint};
use std::sync::Arc;

/// Wraps external research calls with the expiring cache
///
/// The cache is an injected dependency, never a process-wide singleton, so
/// tests substitute an in-memory instance with zero disk I/O.
#[derive(Debug, Clone)]
pub struct ResearchCacheAdapter {
    cache: Arc<ExpiringCache>,
}

impl ResearchCacheAdapter {
    /// Create an adapter over the given cache
    #[inline]
    #[must_use]
    pub fn new(cache: Arc<ExpiringCache>) -> Self {
        Self { cache }
    }

    /// The underlying cache, for operational status/clear calls
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &ExpiringCache {
        &self.cache
    }

    /// Look up or fetch one research call
    ///
    /// # Errors
    /// Propagates the provider's error unchanged; nothing is cached on
    /// failure.
    pub async fn call_cached(
        &self,
        category: Category,
        query: &str,
        ttl_seconds: u64,
        provider: &dyn ResearchProvider,
    ) -> Result<Vec<Finding>, ProviderError> {
        let key = Fingerprint::new(category.as_str(), &[query]);

        if let Some(value) = self.cache.get(&key) {
            match serde_json::from_value::<Vec<Finding>>(value) {
                Ok(findings) => {
                    tracing::debug!(%category, %key, "research served from cache");
                    return Ok(findings);
                }
                Err(e) => {
                    tracing::warn!(%category, %key, error = %e, "undecodable cache value, refetching");
                }
            }
        }

        let response = provider.fetch(category, query).await?;
        tracing::debug!(
            %category,
            findings = response.findings.len(),
            cost = response.cost_estimate,
            "research fetched upstream"
        );

        match serde_json::to_value(&response.findings) {
            Ok(value) => {
                self.cache
                    .put(&key, category.as_str(), value, ttl_seconds, response.cost_estimate);
            }
            Err(e) => {
                tracing::warn!(%category, error = %e, "findings not serializable, skipping cache");
            }
        }
        Ok(response.findings)
    }
}
