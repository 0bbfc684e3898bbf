//! prepd-similarity — duplicate scoring for interview records
//!
//! Decides whether a newly observed interview looks like one already on
//! file. Email wording and entity-extraction noise make exact-string
//! duplicates rare even for the same real-world interview, so fields are
//! normalized and scored by token overlap, weighted by how identifying each
//! field is, with a penalty when the scheduled dates are far apart.

#![warn(unreachable_pub)]

pub mod matcher;
pub mod normalize;

pub use matcher::{
    MatchBreakdown, MatchFields, MatcherConfig, SimilarityMatcher, COMPANY_WEIGHT,
    INTERVIEWER_WEIGHT, ROLE_WEIGHT,
};
pub use normalize::{normalize, similarity_key, token_overlap};
