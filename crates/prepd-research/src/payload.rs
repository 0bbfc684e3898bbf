//! Accumulated research payload and its scoring
//!
//! The payload is keyed by category, so merging is deterministic given the
//! same per-category results regardless of task completion order. Quality
//! measures completeness of the evidence; confidence measures reliability of
//! the process that produced it.

use crate::provider::{Category, Finding};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Findings gathered for one category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryFindings {
    /// Findings, in provider order
    pub findings: Vec<Finding>,
}

impl CategoryFindings {
    /// Wrap a findings list
    #[inline]
    #[must_use]
    pub fn new(findings: Vec<Finding>) -> Self {
        Self { findings }
    }

    /// Richness heuristic in [0, 1]
    ///
    /// Empty results score 0; any findings score 0.7, raised to 1.0 when at
    /// least one finding cites a source. Uncited research still counts, just
    /// not as fully trustworthy coverage.
    #[must_use]
    pub fn richness(&self) -> f64 {
        if self.findings.is_empty() {
            return 0.0;
        }
        let cited = self.findings.iter().any(|f| !f.sources.is_empty());
        if cited {
            1.0
        } else {
            0.7
        }
    }
}

/// Research accumulated across reflection rounds for one record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchPayload {
    /// Successful results per category
    pub categories: BTreeMap<Category, CategoryFindings>,
    /// Most recent error per category that has no successful result
    pub errors: BTreeMap<Category, String>,
}

impl ResearchPayload {
    /// Create an empty payload
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a successful category result
    ///
    /// Clears any earlier error for the category; a success supersedes it.
    pub fn merge_success(&mut self, category: Category, findings: Vec<Finding>) {
        self.categories
            .insert(category, CategoryFindings::new(findings));
        self.errors.remove(&category);
    }

    /// Record a category failure
    ///
    /// Never displaces a successful result from an earlier round.
    pub fn record_error(&mut self, category: Category, message: impl Into<String>) {
        if !self.categories.contains_key(&category) {
            self.errors.insert(category, message.into());
        }
    }

    /// Categories still lacking non-empty findings
    #[must_use]
    pub fn insufficient_categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| {
                self.categories
                    .get(c)
                    .map_or(true, |f| f.findings.is_empty())
            })
            .collect()
    }

    /// Number of categories with non-empty findings
    #[must_use]
    pub fn covered(&self) -> usize {
        Category::ALL.len() - self.insufficient_categories().len()
    }

    /// Research completeness in [0, 1]
    ///
    /// Weighted fraction of categories with usable results, scaled by each
    /// category's richness.
    #[must_use]
    pub fn quality_score(&self) -> f64 {
        Category::ALL
            .into_iter()
            .map(|c| {
                let richness = self.categories.get(&c).map_or(0.0, CategoryFindings::richness);
                c.weight() * richness
            })
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }

    /// Process reliability in [0, 1]
    ///
    /// 0.8 base when no category is in an error state, 0.5 otherwise, plus
    /// up to 0.2 for category coverage.
    #[must_use]
    pub fn confidence_score(&self) -> f64 {
        let base = if self.errors.is_empty() { 0.8 } else { 0.5 };
        let coverage = 0.2 * self.covered() as f64 / Category::ALL.len() as f64;
        (base + coverage).clamp(0.0, 1.0)
    }

    /// Serialize for record persistence
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Decode from a persisted record
    ///
    /// # Errors
    /// When the value was not produced by [`Self::to_value`].
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}
