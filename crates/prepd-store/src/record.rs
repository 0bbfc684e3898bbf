//! Interview record types
//!
//! Records are created on first sighting of an email/entity pair, mutated
//! in place on dedup (a duplicate insert never silently overwrites), and
//! never hard-deleted.

use crate::state::InterviewStatus;
use chrono::{DateTime, Utc};
use prepd_cache::Fingerprint;
use prepd_similarity::{similarity_key, MatchFields};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use ulid::Ulid;

/// Unique record identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub Ulid);

impl RecordId {
    /// Generate a new record id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

/// Structured tuple handed over by entity extraction
///
/// All fields may be missing; extraction over free-form email text is
/// best-effort.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedEntities {
    /// Company name
    pub company: Option<String>,
    /// Role title
    pub role: Option<String>,
    /// Interviewer name
    pub interviewer: Option<String>,
    /// Scheduled interview time
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Short excerpt of the source email, for operator review
    pub source_context: Option<String>,
}

impl ExtractedEntities {
    /// Create an empty tuple
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With company name
    #[inline]
    #[must_use]
    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    /// With role title
    #[inline]
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// With interviewer name
    #[inline]
    #[must_use]
    pub fn with_interviewer(mut self, interviewer: impl Into<String>) -> Self {
        self.interviewer = Some(interviewer.into());
        self
    }

    /// With scheduled time
    #[inline]
    #[must_use]
    pub fn with_scheduled_at(mut self, scheduled_at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(scheduled_at);
        self
    }

    /// With source excerpt
    #[inline]
    #[must_use]
    pub fn with_source_context(mut self, context: impl Into<String>) -> Self {
        self.source_context = Some(context.into());
        self
    }

    /// View for similarity scoring
    #[must_use]
    pub fn match_fields(&self) -> MatchFields<'_> {
        MatchFields {
            company: self.company.as_deref(),
            role: self.role.as_deref(),
            interviewer: self.interviewer.as_deref(),
            scheduled_at: self.scheduled_at,
        }
    }

    /// Composite key for fast candidate lookup
    #[must_use]
    pub fn similarity_key(&self) -> String {
        similarity_key(
            self.company.as_deref(),
            self.role.as_deref(),
            self.interviewer.as_deref(),
        )
    }

    /// Fingerprint for the exact-duplicate fast path
    #[must_use]
    pub fn content_fingerprint(&self) -> Fingerprint {
        let scheduled = self
            .scheduled_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        Fingerprint::new(
            "interview",
            &[
                self.company.as_deref().unwrap_or(""),
                self.role.as_deref().unwrap_or(""),
                self.interviewer.as_deref().unwrap_or(""),
                &scheduled,
            ],
        )
    }
}

/// One entry in a record's status audit trail
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatusChange {
    /// Status before the transition
    pub from: InterviewStatus,
    /// Status after the transition
    pub to: InterviewStatus,
    /// When the transition was applied
    pub at: DateTime<Utc>,
}

/// A tracked interview
///
/// Unknown or missing fields in persisted files default to `None` so that
/// records written by older versions still load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewRecord {
    /// Opaque unique identifier, assigned at creation, immutable
    pub id: RecordId,
    /// Company name
    #[serde(default)]
    pub company: Option<String>,
    /// Role title
    #[serde(default)]
    pub role: Option<String>,
    /// Interviewer name
    #[serde(default)]
    pub interviewer: Option<String>,
    /// Scheduled interview time
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Short excerpt of the source email
    #[serde(default)]
    pub source_context: Option<String>,
    /// Lifecycle status
    pub status: InterviewStatus,
    /// Normalized composite of company+role+interviewer
    #[serde(default)]
    pub similarity_key: String,
    /// Exact-duplicate fast-path fingerprint
    #[serde(default)]
    pub content_fingerprint: Fingerprint,
    /// Findings attached by the reflection loop
    #[serde(default)]
    pub research_payload: Option<serde_json::Value>,
    /// Research completeness in [0, 1], set after research completes
    #[serde(default)]
    pub quality_score: Option<f64>,
    /// Research process reliability in [0, 1]
    #[serde(default)]
    pub confidence_score: Option<f64>,
    /// Set when research was exhausted below the quality threshold;
    /// downstream consumers warn instead of presenting thin research
    #[serde(default)]
    pub research_incomplete: bool,
    /// Gray-zone similarity advisory, for manual review
    #[serde(default)]
    pub possible_duplicate_of: Option<RecordId>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Status transition audit trail, append-only
    #[serde(default)]
    pub history: Vec<StatusChange>,
}

impl InterviewRecord {
    /// Create a record in state `New` from an extraction tuple
    #[must_use]
    pub fn from_entities(entities: ExtractedEntities) -> Self {
        let now = Utc::now();
        let similarity_key = entities.similarity_key();
        let content_fingerprint = entities.content_fingerprint();
        Self {
            id: RecordId::new(),
            company: entities.company,
            role: entities.role,
            interviewer: entities.interviewer,
            scheduled_at: entities.scheduled_at,
            source_context: entities.source_context,
            status: InterviewStatus::New,
            similarity_key,
            content_fingerprint,
            research_payload: None,
            quality_score: None,
            confidence_score: None,
            research_incomplete: false,
            possible_duplicate_of: None,
            created_at: now,
            updated_at: now,
            history: Vec::new(),
        }
    }

    /// View for similarity scoring
    #[must_use]
    pub fn match_fields(&self) -> MatchFields<'_> {
        MatchFields {
            company: self.company.as_deref(),
            role: self.role.as_deref(),
            interviewer: self.interviewer.as_deref(),
            scheduled_at: self.scheduled_at,
        }
    }

    /// Fill fields the record is missing from a later sighting
    ///
    /// Populated fields are never overwritten; a duplicate insert updates
    /// in place, it does not replace. Returns whether anything changed.
    pub(crate) fn merge_missing(&mut self, entities: &ExtractedEntities) -> bool {
        let mut changed = false;
        if self.company.is_none() && entities.company.is_some() {
            self.company.clone_from(&entities.company);
            changed = true;
        }
        if self.role.is_none() && entities.role.is_some() {
            self.role.clone_from(&entities.role);
            changed = true;
        }
        if self.interviewer.is_none() && entities.interviewer.is_some() {
            self.interviewer.clone_from(&entities.interviewer);
            changed = true;
        }
        if self.scheduled_at.is_none() && entities.scheduled_at.is_some() {
            self.scheduled_at = entities.scheduled_at;
            changed = true;
        }
        if changed {
            self.similarity_key = similarity_key(
                self.company.as_deref(),
                self.role.as_deref(),
                self.interviewer.as_deref(),
            );
        }
        changed
    }
}
