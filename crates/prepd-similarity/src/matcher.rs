//! Weighted similarity scoring
//!
//! Field weights reflect how identifying each field is for a real-world
//! interview: company carries half the signal, role less, interviewer least.
//! A large gap between scheduled dates strongly suggests a distinct
//! interview cycle even for the same company/role pairing, so it penalizes
//! the final score instead of contributing to it.

use crate::normalize::{normalize, token_overlap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weight of the company field
pub const COMPANY_WEIGHT: f64 = 0.5;
/// Weight of the role field
pub const ROLE_WEIGHT: f64 = 0.3;
/// Weight of the interviewer field
pub const INTERVIEWER_WEIGHT: f64 = 0.2;

/// Tunable similarity parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Weight of the company field
    pub company_weight: f64,
    /// Weight of the role field
    pub role_weight: f64,
    /// Weight of the interviewer field
    pub interviewer_weight: f64,
    /// Scheduled dates further apart than this trigger the penalty
    pub date_window_days: i64,
    /// Multiplier applied to the score when the date window is exceeded
    pub date_gap_penalty: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            company_weight: COMPANY_WEIGHT,
            role_weight: ROLE_WEIGHT,
            interviewer_weight: INTERVIEWER_WEIGHT,
            date_window_days: 30,
            date_gap_penalty: 0.5,
        }
    }
}

/// Borrowed view of the fields that participate in similarity scoring
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchFields<'a> {
    /// Company name, if extracted
    pub company: Option<&'a str>,
    /// Role title, if extracted
    pub role: Option<&'a str>,
    /// Interviewer name, if extracted
    pub interviewer: Option<&'a str>,
    /// Scheduled interview time, if extracted
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Per-field scoring detail, for advisory display and review
#[derive(Debug, Clone, Default)]
pub struct MatchBreakdown {
    /// Company field similarity, `None` when missing on either side
    pub company: Option<f64>,
    /// Role field similarity, `None` when missing on either side
    pub role: Option<f64>,
    /// Interviewer field similarity, `None` when missing on either side
    pub interviewer: Option<f64>,
    /// Whether the date-gap penalty fired
    pub date_penalized: bool,
    /// Final bounded score
    pub score: f64,
    /// Human-readable reasons
    pub reasons: Vec<String>,
}

/// Compares two interview field tuples and produces a score in [0, 1]
#[derive(Debug, Clone, Default)]
pub struct SimilarityMatcher {
    config: MatcherConfig,
}

impl SimilarityMatcher {
    /// Create a matcher with the given parameters
    #[inline]
    #[must_use]
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Get the active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Score the similarity of two field tuples
    ///
    /// Missing fields on either side contribute 0 to their weighted term,
    /// never a match: a record carrying only a company name cannot exceed
    /// the company weight.
    #[must_use]
    pub fn score(&self, a: &MatchFields<'_>, b: &MatchFields<'_>) -> f64 {
        self.explain(a, b).score
    }

    /// Score with a per-field breakdown
    #[must_use]
    pub fn explain(&self, a: &MatchFields<'_>, b: &MatchFields<'_>) -> MatchBreakdown {
        let company = field_similarity(a.company, b.company);
        let role = field_similarity(a.role, b.role);
        let interviewer = field_similarity(a.interviewer, b.interviewer);

        let mut score = company.unwrap_or(0.0) * self.config.company_weight
            + role.unwrap_or(0.0) * self.config.role_weight
            + interviewer.unwrap_or(0.0) * self.config.interviewer_weight;

        let mut reasons = Vec::new();
        if let Some(sim) = company {
            reasons.push(format!("company: {sim:.2}"));
        }
        if let Some(sim) = role {
            reasons.push(format!("role: {sim:.2}"));
        }
        if let Some(sim) = interviewer {
            reasons.push(format!("interviewer: {sim:.2}"));
        }

        let mut date_penalized = false;
        if let (Some(da), Some(db)) = (a.scheduled_at, b.scheduled_at) {
            let gap_days = (da - db).num_days().abs();
            if gap_days > self.config.date_window_days {
                score *= self.config.date_gap_penalty;
                date_penalized = true;
                reasons.push(format!("date gap: {gap_days} days"));
            }
        }

        MatchBreakdown {
            company,
            role,
            interviewer,
            date_penalized,
            score: score.clamp(0.0, 1.0),
            reasons,
        }
    }
}

/// Similarity of a single field; `None` when missing on either side
fn field_similarity(a: Option<&str>, b: Option<&str>) -> Option<f64> {
    let a = normalize(a?);
    let b = normalize(b?);
    if a.is_empty() || b.is_empty() {
        return None;
    }
    Some(token_overlap(&a, &b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fields<'a>(
        company: Option<&'a str>,
        role: Option<&'a str>,
        interviewer: Option<&'a str>,
    ) -> MatchFields<'a> {
        MatchFields {
            company,
            role,
            interviewer,
            scheduled_at: None,
        }
    }

    fn at(days: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap() + chrono::Duration::days(days)
    }

    #[test]
    fn identical_fields_score_one() {
        let matcher = SimilarityMatcher::default();
        let a = fields(Some("Acme Corp"), Some("Backend Engineer"), Some("J. Lee"));
        let b = fields(Some("Acme Inc"), Some("backend engineer"), Some("j lee"));
        assert!((matcher.score(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn company_alone_caps_at_company_weight() {
        let matcher = SimilarityMatcher::default();
        let a = fields(Some("Acme"), None, None);
        let b = fields(Some("Acme"), None, None);
        assert!((matcher.score(&a, &b) - COMPANY_WEIGHT).abs() < 1e-9);
    }

    #[test]
    fn missing_field_contributes_zero_not_match() {
        let matcher = SimilarityMatcher::default();
        let a = fields(Some("Acme"), Some("Backend Engineer"), None);
        let b = fields(Some("Acme"), Some("Backend Engineer"), Some("J. Lee"));
        assert!((matcher.score(&a, &b) - (COMPANY_WEIGHT + ROLE_WEIGHT)).abs() < 1e-9);
    }

    #[test]
    fn date_gap_beyond_window_halves_score() {
        let matcher = SimilarityMatcher::default();
        let mut a = fields(Some("Acme"), Some("Backend Engineer"), Some("J. Lee"));
        let mut b = a;
        a.scheduled_at = Some(at(0));
        b.scheduled_at = Some(at(90));

        let score = matcher.score(&a, &b);
        assert!((score - 0.5).abs() < 1e-9);
        // The penalized score must fall below the duplicate threshold.
        assert!(score < 0.8);
    }

    #[test]
    fn date_gap_inside_window_is_not_penalized() {
        let matcher = SimilarityMatcher::default();
        let mut a = fields(Some("Acme"), Some("Backend Engineer"), Some("J. Lee"));
        let mut b = a;
        a.scheduled_at = Some(at(0));
        b.scheduled_at = Some(at(10));
        assert!((matcher.score(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn partial_role_overlap_scores_between() {
        let matcher = SimilarityMatcher::default();
        let a = fields(Some("Acme"), Some("Backend Engineer"), None);
        let b = fields(Some("Acme"), Some("Senior Backend Engineer"), None);

        let score = matcher.score(&a, &b);
        let expected = COMPANY_WEIGHT + ROLE_WEIGHT * (2.0 / 3.0);
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn breakdown_carries_reasons() {
        let matcher = SimilarityMatcher::default();
        let a = fields(Some("Acme"), Some("Backend Engineer"), None);
        let b = fields(Some("Acme"), Some("Backend Engineer"), None);

        let breakdown = matcher.explain(&a, &b);
        assert_eq!(breakdown.company, Some(1.0));
        assert_eq!(breakdown.interviewer, None);
        assert!(!breakdown.reasons.is_empty());
    }

    #[test]
    fn suffix_only_company_is_treated_as_missing() {
        let matcher = SimilarityMatcher::default();
        let a = fields(Some("Inc."), None, None);
        let b = fields(Some("Inc."), None, None);
        assert_eq!(matcher.score(&a, &b), 0.0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn score_is_bounded(
                company_a in ".{0,40}",
                company_b in ".{0,40}",
                role_a in ".{0,40}",
                role_b in ".{0,40}",
                gap_days in 0i64..400,
            ) {
                let matcher = SimilarityMatcher::default();
                let a = MatchFields {
                    company: Some(company_a.as_str()),
                    role: Some(role_a.as_str()),
                    interviewer: None,
                    scheduled_at: Some(at(0)),
                };
                let b = MatchFields {
                    company: Some(company_b.as_str()),
                    role: Some(role_b.as_str()),
                    interviewer: None,
                    scheduled_at: Some(at(gap_days)),
                };
                let score = matcher.score(&a, &b);
                prop_assert!((0.0..=1.0).contains(&score));
            }

            #[test]
            fn score_is_symmetric(
                company_a in "[a-z ]{0,30}",
                company_b in "[a-z ]{0,30}",
            ) {
                let matcher = SimilarityMatcher::default();
                let a = MatchFields { company: Some(company_a.as_str()), ..Default::default() };
                let b = MatchFields { company: Some(company_b.as_str()), ..Default::default() };
                prop_assert_eq!(matcher.score(&a, &b), matcher.score(&b, &a));
            }
        }
    }
}
