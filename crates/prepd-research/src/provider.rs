//! Upstream research capability
//!
//! The core never knows which concrete search or generation API backs a
//! call; anything implementing [`ResearchProvider`] works. Failures carry a
//! message, not an API-specific payload, so they can be absorbed into
//! per-category quality signal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Research category dispatched per reflection round
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Company background and recent news
    Company,
    /// Role expectations and required skills
    Role,
    /// Interviewer background
    Interviewer,
}

impl Category {
    /// All categories, in weight order
    pub const ALL: [Category; 3] = [Category::Company, Category::Role, Category::Interviewer];

    /// Stable name, used in fingerprints and cache files
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Company => "company",
            Category::Role => "role",
            Category::Interviewer => "interviewer",
        }
    }

    /// Contribution of this category to the overall quality score
    ///
    /// Company research carries half the weight; the same rationale as the
    /// similarity weights — it is the most identifying and the most reusable
    /// part of the guide.
    #[inline]
    #[must_use]
    pub fn weight(self) -> f64 {
        match self {
            Category::Company => 0.5,
            Category::Role => 0.3,
            Category::Interviewer => 0.2,
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single research finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Finding text
    pub summary: String,
    /// Citation sources backing the finding
    #[serde(default)]
    pub sources: Vec<String>,
}

impl Finding {
    /// Create a finding without sources
    #[inline]
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            sources: Vec::new(),
        }
    }

    /// With a citation source
    #[inline]
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }
}

/// Successful provider result
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Findings for the queried category
    pub findings: Vec<Finding>,
    /// Attributable cost of the call, for cache savings accounting
    pub cost_estimate: f64,
}

/// Upstream call failure
///
/// Recorded as a per-category error; it never aborts an iteration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The upstream API reported a failure
    #[error("upstream call failed: {0}")]
    Upstream(String),
    /// The upstream API is not reachable
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}

/// Polymorphic research capability
///
/// Implementations are injected; tests substitute scripted fakes with zero
/// network I/O.
#[async_trait]
pub trait ResearchProvider: Send + Sync {
    /// Run one research call
    async fn fetch(&self, category: Category, query: &str)
        -> Result<ProviderResponse, ProviderError>;
}
