//! Persistent interview repository
//!
//! Dedup on insert, lifecycle transitions, and per-record research session
//! locks. Each record is one JSON file under the store directory; a corrupt
//! file is skipped at open (it cannot cascade) and raised only when fetched
//! directly.

use crate::error::StoreError;
use crate::record::{ExtractedEntities, InterviewRecord, RecordId, StatusChange};
use crate::state::{validate_transition, InterviewStatus};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use prepd_cache::Fingerprint;
use prepd_similarity::{MatcherConfig, SimilarityMatcher};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Similarity at or above which an insert is treated as a duplicate
    pub duplicate_threshold: f64,
    /// Floor of the gray zone; scores in `[floor, threshold)` create a new
    /// record carrying a possible-duplicate advisory
    pub gray_zone_floor: f64,
    /// Similarity parameters
    pub matcher: MatcherConfig,
}

impl StoreConfig {
    /// Create the default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With duplicate threshold
    #[inline]
    #[must_use]
    pub fn with_duplicate_threshold(mut self, threshold: f64) -> Self {
        self.duplicate_threshold = threshold;
        self
    }

    /// With gray-zone floor
    #[inline]
    #[must_use]
    pub fn with_gray_zone_floor(mut self, floor: f64) -> Self {
        self.gray_zone_floor = floor;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: 0.8,
            gray_zone_floor: 0.6,
            matcher: MatcherConfig::default(),
        }
    }
}

/// Advisory lock serializing research sessions per record
///
/// Held by a reflection loop for the whole run; released on drop when the
/// loop reaches a terminal state. While held, a second `begin_session` for
/// the same record fails with `SessionBusy`.
#[derive(Debug)]
pub struct SessionLock {
    id: RecordId,
    sessions: Arc<DashMap<RecordId, ()>>,
}

impl SessionLock {
    /// The locked record
    #[inline]
    #[must_use]
    pub fn record_id(&self) -> RecordId {
        self.id
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        self.sessions.remove(&self.id);
    }
}

/// Persistent repository of interview records
#[derive(Debug)]
pub struct InterviewStore {
    dir: PathBuf,
    config: StoreConfig,
    matcher: SimilarityMatcher,
    records: DashMap<RecordId, InterviewRecord>,
    by_key: DashMap<String, Vec<RecordId>>,
    by_fingerprint: DashMap<Fingerprint, RecordId>,
    /// Serializes lookup_or_create so concurrent sessions cannot
    /// double-create a record
    insert_lock: Mutex<()>,
    sessions: Arc<DashMap<RecordId, ()>>,
}

impl InterviewStore {
    /// Open (or create) a store rooted at `dir`
    ///
    /// Corrupt record files are skipped with a warning; they surface as
    /// `CorruptRecord` only when fetched directly.
    ///
    /// # Errors
    /// `StoreError::Io` when the directory cannot be created or listed.
    pub fn open(dir: impl Into<PathBuf>, config: StoreConfig) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let store = Self {
            matcher: SimilarityMatcher::new(config.matcher.clone()),
            dir,
            config,
            records: DashMap::new(),
            by_key: DashMap::new(),
            by_fingerprint: DashMap::new(),
            insert_lock: Mutex::new(()),
            sessions: Arc::new(DashMap::new()),
        };

        for entry in fs::read_dir(&store.dir)?.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable record file, skipping");
                    continue;
                }
            };
            match serde_json::from_slice::<InterviewRecord>(&bytes) {
                Ok(record) => store.index(&record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "corrupt record file, skipping");
                }
            }
        }

        tracing::info!(dir = %store.dir.display(), count = store.records.len(), "interview store opened");
        Ok(store)
    }

    /// Number of loaded records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Deduplicating insert
    ///
    /// Scores the extraction against stored records: an exact fingerprint
    /// match or a similarity at/above the duplicate threshold updates that
    /// record in place (filling missing fields only) and returns it with
    /// `is_new = false`. A score in the gray zone creates a new record
    /// carrying a `possible_duplicate_of` advisory — avoiding silent data
    /// loss is preferred over avoiding occasional duplicates. Anything else
    /// creates a plain new record in state `New`.
    ///
    /// # Errors
    /// `StoreError::Io` when the new or updated record cannot be persisted.
    pub async fn lookup_or_create(
        &self,
        entities: ExtractedEntities,
    ) -> Result<(InterviewRecord, bool), StoreError> {
        let _guard = self.insert_lock.lock().await;

        let fingerprint = entities.content_fingerprint();
        if let Some(id) = self.by_fingerprint.get(&fingerprint).map(|r| *r.value()) {
            // An archived record is disposed; a fresh sighting starts over.
            let archived = self
                .records
                .get(&id)
                .is_some_and(|r| r.status == InterviewStatus::Archived);
            if !archived {
                tracing::debug!(record = %id, "exact duplicate");
                return Ok((self.update_existing(id, &entities, fingerprint)?, false));
            }
        }

        let key = entities.similarity_key();
        let fields = entities.match_fields();

        // Fast path: candidates sharing the similarity key.
        let candidates: Vec<RecordId> = self
            .by_key
            .get(&key)
            .map(|ids| ids.clone())
            .unwrap_or_default();
        let mut best = self.best_match(&candidates, &fields);

        // The key only matches when every extracted field agrees, so widen
        // to a full scan before concluding the record is unseen.
        if best.map_or(true, |(score, _)| score < self.config.duplicate_threshold) {
            let all: Vec<RecordId> = self.records.iter().map(|r| *r.key()).collect();
            best = self.best_match(&all, &fields);
        }

        if let Some((score, id)) = best {
            if score >= self.config.duplicate_threshold {
                tracing::info!(record = %id, score, "duplicate interview, updating in place");
                return Ok((self.update_existing(id, &entities, fingerprint)?, false));
            }
        }

        let mut record = InterviewRecord::from_entities(entities);
        if let Some((score, id)) = best {
            if score >= self.config.gray_zone_floor {
                let reasons = self
                    .records
                    .get(&id)
                    .map(|candidate| {
                        self.matcher
                            .explain(&record.match_fields(), &candidate.match_fields())
                            .reasons
                    })
                    .unwrap_or_default();
                tracing::info!(record = %record.id, candidate = %id, score, ?reasons,
                    "ambiguous similarity, keeping both with advisory");
                record.possible_duplicate_of = Some(id);
            }
        }

        self.persist(&record)?;
        self.index(&record);
        tracing::info!(record = %record.id, key = %record.similarity_key, "interview recorded");
        Ok((record, true))
    }

    /// Fetch a record by id
    ///
    /// # Errors
    /// `NotFound` when no such record exists; `CorruptRecord` when its file
    /// exists but cannot be decoded.
    pub fn get(&self, id: RecordId) -> Result<InterviewRecord, StoreError> {
        if let Some(record) = self.records.get(&id) {
            return Ok(record.clone());
        }
        let path = self.record_path(id);
        if path.exists() {
            let bytes = fs::read(&path)?;
            return match serde_json::from_slice::<InterviewRecord>(&bytes) {
                Ok(record) => {
                    self.index(&record);
                    Ok(record)
                }
                Err(source) => Err(StoreError::CorruptRecord { path, source }),
            };
        }
        Err(StoreError::NotFound(id))
    }

    /// Apply a lifecycle transition
    ///
    /// # Errors
    /// `InvalidTransition` when the move is not in the state machine —
    /// raised, never silently corrected.
    pub fn transition(
        &self,
        id: RecordId,
        new_status: InterviewStatus,
    ) -> Result<InterviewRecord, StoreError> {
        let record = {
            let mut entry = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            validate_transition(entry.status, new_status)?;
            let from = entry.status;
            let now = Utc::now();
            entry.status = new_status;
            entry.history.push(StatusChange {
                from,
                to: new_status,
                at: now,
            });
            entry.updated_at = now;
            tracing::info!(record = %id, %from, to = %new_status, "status transition");
            entry.clone()
        };
        self.persist(&record)?;
        Ok(record)
    }

    /// Persist finished research and advance `Preparing -> Prepped`
    ///
    /// # Errors
    /// `InvalidTransition` when the record is not in `Preparing`.
    pub fn attach_research(
        &self,
        id: RecordId,
        payload: serde_json::Value,
        quality_score: f64,
        confidence_score: f64,
    ) -> Result<InterviewRecord, StoreError> {
        let record = {
            let mut entry = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            validate_transition(entry.status, InterviewStatus::Prepped)?;
            let from = entry.status;
            let now = Utc::now();
            entry.research_payload = Some(payload);
            entry.quality_score = Some(quality_score);
            entry.confidence_score = Some(confidence_score);
            entry.status = InterviewStatus::Prepped;
            entry.history.push(StatusChange {
                from,
                to: InterviewStatus::Prepped,
                at: now,
            });
            entry.updated_at = now;
            tracing::info!(record = %id, quality_score, confidence_score, "research attached");
            entry.clone()
        };
        self.persist(&record)?;
        Ok(record)
    }

    /// Persist partial findings while the record stays in `Preparing`
    ///
    /// Used when a reflection run is cancelled between iterations, so a
    /// later run resumes from these partials instead of re-querying.
    ///
    /// # Errors
    /// `InvalidTransition` when the record cannot (re-)enter `Preparing`.
    pub fn stash_partial(
        &self,
        id: RecordId,
        payload: serde_json::Value,
    ) -> Result<InterviewRecord, StoreError> {
        let record = {
            let mut entry = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            validate_transition(entry.status, InterviewStatus::Preparing)?;
            let from = entry.status;
            let now = Utc::now();
            entry.research_payload = Some(payload);
            entry.status = InterviewStatus::Preparing;
            entry.history.push(StatusChange {
                from,
                to: InterviewStatus::Preparing,
                at: now,
            });
            entry.updated_at = now;
            tracing::info!(record = %id, "partial research stashed");
            entry.clone()
        };
        self.persist(&record)?;
        Ok(record)
    }

    /// Flag the record for downstream warning display
    ///
    /// Set when the reflection loop exhausted its iterations below the
    /// quality threshold.
    ///
    /// # Errors
    /// `NotFound` when no such record exists.
    pub fn flag_research_incomplete(&self, id: RecordId) -> Result<(), StoreError> {
        let record = {
            let mut entry = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            entry.research_incomplete = true;
            entry.updated_at = Utc::now();
            entry.clone()
        };
        self.persist(&record)?;
        Ok(())
    }

    /// Records still needing research, oldest first
    #[must_use]
    pub fn find_unprepped(&self, limit: usize) -> Vec<InterviewRecord> {
        self.find_unprepped_filtered(limit, |_| true)
    }

    /// Records still needing research, oldest first, filtered by a
    /// caller-supplied priority predicate
    #[must_use]
    pub fn find_unprepped_filtered<F>(&self, limit: usize, priority: F) -> Vec<InterviewRecord>
    where
        F: Fn(&InterviewRecord) -> bool,
    {
        let mut unprepped: Vec<InterviewRecord> = self
            .records
            .iter()
            .filter(|r| r.status.is_unprepped() && priority(r.value()))
            .map(|r| r.value().clone())
            .collect();
        unprepped.sort_by_key(|r| (r.created_at, r.id));
        unprepped.truncate(limit);
        unprepped
    }

    /// All records, oldest first
    #[must_use]
    pub fn list(&self) -> Vec<InterviewRecord> {
        let mut records: Vec<InterviewRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| (r.created_at, r.id));
        records
    }

    /// Status distribution snapshot
    #[must_use]
    pub fn status_counts(&self) -> BTreeMap<InterviewStatus, usize> {
        let mut counts = BTreeMap::new();
        for record in self.records.iter() {
            *counts.entry(record.status).or_insert(0) += 1;
        }
        counts
    }

    /// Acquire the record's research session lock
    ///
    /// One active reflection loop per record at a time; the lock is
    /// released when the returned guard drops.
    ///
    /// # Errors
    /// `SessionBusy` when another session holds the lock; `NotFound` when
    /// the record does not exist.
    pub fn begin_session(&self, id: RecordId) -> Result<SessionLock, StoreError> {
        if !self.records.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        match self.sessions.entry(id) {
            Entry::Occupied(_) => Err(StoreError::SessionBusy(id)),
            Entry::Vacant(slot) => {
                slot.insert(());
                tracing::debug!(record = %id, "research session started");
                Ok(SessionLock {
                    id,
                    sessions: Arc::clone(&self.sessions),
                })
            }
        }
    }

    fn best_match(
        &self,
        candidates: &[RecordId],
        fields: &prepd_similarity::MatchFields<'_>,
    ) -> Option<(f64, RecordId)> {
        let mut best: Option<(f64, RecordId)> = None;
        for id in candidates {
            let Some(record) = self.records.get(id) else {
                continue;
            };
            if record.status == InterviewStatus::Archived {
                continue;
            }
            let score = self.matcher.score(fields, &record.match_fields());
            if best.map_or(true, |(b, _)| score > b) {
                best = Some((score, *id));
            }
        }
        best
    }

    fn update_existing(
        &self,
        id: RecordId,
        entities: &ExtractedEntities,
        fingerprint: Fingerprint,
    ) -> Result<InterviewRecord, StoreError> {
        let (record, old_key) = {
            let mut entry = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            let old_key = entry.similarity_key.clone();
            entry.merge_missing(entities);
            entry.updated_at = Utc::now();
            (entry.clone(), old_key)
        };

        if record.similarity_key != old_key {
            if let Some(mut ids) = self.by_key.get_mut(&old_key) {
                ids.retain(|other| *other != id);
            }
            self.by_key
                .entry(record.similarity_key.clone())
                .or_default()
                .push(id);
        }
        // Later sightings with this exact extraction take the fast path.
        self.by_fingerprint.insert(fingerprint, id);

        self.persist(&record)?;
        Ok(record)
    }

    fn index(&self, record: &InterviewRecord) {
        self.records.insert(record.id, record.clone());
        self.by_key
            .entry(record.similarity_key.clone())
            .or_default()
            .push(record.id);
        if !record.content_fingerprint.is_zero() {
            self.by_fingerprint
                .insert(record.content_fingerprint, record.id);
        }
    }

    fn record_path(&self, id: RecordId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn persist(&self, record: &InterviewRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(record).map_err(|e| {
            StoreError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        fs::write(self.record_path(record.id), bytes)?;
        Ok(())
    }
}
