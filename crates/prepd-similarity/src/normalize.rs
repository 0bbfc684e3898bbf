//! Entity string normalization
//!
//! All comparisons and index keys go through [`normalize`] so that
//! "Acme Corp.", "ACME corp" and "acme" agree on a single canonical form.

use std::collections::BTreeSet;

/// Corporate suffixes carrying no identifying signal
const LEGAL_SUFFIXES: &[&str] = &[
    "inc", "llc", "ltd", "corp", "co", "gmbh", "plc", "sa", "ag", "limited", "incorporated",
    "corporation",
];

/// Canonicalize an entity string
///
/// Case-folds, trims punctuation from token edges, drops legal suffixes,
/// and collapses whitespace. May return an empty string (e.g. the input was
/// only punctuation), which callers treat as a missing field.
#[must_use]
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .map(|token| {
            token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|token| !token.is_empty() && !LEGAL_SUFFIXES.contains(&token.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Token-overlap (Jaccard) ratio between two normalized strings
///
/// Exact match scores 1.0; disjoint token sets score 0.0. Inputs are
/// expected to be pre-normalized.
#[must_use]
pub fn token_overlap(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let ta: BTreeSet<&str> = a.split(' ').collect();
    let tb: BTreeSet<&str> = b.split(' ').collect();
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Composite key for fast candidate lookup before full similarity scoring
///
/// Missing fields contribute an empty segment so that the key is stable
/// regardless of which fields were extracted.
#[must_use]
pub fn similarity_key(
    company: Option<&str>,
    role: Option<&str>,
    interviewer: Option<&str>,
) -> String {
    let part = |field: Option<&str>| field.map(normalize).unwrap_or_default();
    format!(
        "{}|{}|{}",
        part(company),
        part(role),
        part(interviewer)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_legal_suffixes() {
        assert_eq!(normalize("Acme Corp"), "acme");
        assert_eq!(normalize("Acme Inc."), "acme");
        assert_eq!(normalize("ACME, LLC"), "acme");
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize("  Backend   Engineer "), "backend engineer");
    }

    #[test]
    fn normalize_can_yield_empty() {
        assert_eq!(normalize("Inc."), "");
        assert_eq!(normalize("---"), "");
    }

    #[test]
    fn overlap_exact_is_one() {
        assert_eq!(token_overlap("backend engineer", "backend engineer"), 1.0);
    }

    #[test]
    fn overlap_partial() {
        // {backend, engineer} vs {senior, backend, engineer}: 2 of 3.
        let score = token_overlap("backend engineer", "senior backend engineer");
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn overlap_disjoint_is_zero() {
        assert_eq!(token_overlap("acme", "globex"), 0.0);
    }

    #[test]
    fn overlap_empty_is_zero() {
        assert_eq!(token_overlap("", "acme"), 0.0);
    }

    #[test]
    fn key_is_stable_for_equivalent_spellings() {
        let a = similarity_key(Some("Acme Corp"), Some("Backend Engineer"), Some("J. Lee"));
        let b = similarity_key(Some("ACME Inc"), Some("backend  engineer"), Some("j lee"));
        assert_eq!(a, b);
    }

    #[test]
    fn key_keeps_missing_field_slots() {
        let key = similarity_key(Some("Acme"), None, None);
        assert_eq!(key, "acme||");
    }
}
