//! Quality-gated research reflection loop
//!
//! Session state machine per record:
//! `collecting -> evaluating -> sufficient (done)`,
//! `insufficient -> collecting` while iterations remain, and
//! `insufficient -> exhausted` at the bound. Exhaustion still persists the
//! best available partials so a record is never stuck in `preparing`; the
//! sub-threshold quality score is kept as the downstream warning signal.

use crate::adapter::ResearchCacheAdapter;
use crate::payload::ResearchPayload;
use crate::provider::{Category, Finding, ResearchProvider};
use prepd_store::{InterviewRecord, InterviewStatus, InterviewStore, RecordId, StoreError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Reflection loop configuration
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Quality score at which research is accepted
    pub quality_threshold: f64,
    /// Additional collection rounds after the first; the loop evaluates at
    /// most `max_iterations + 1` times
    pub max_iterations: u32,
    /// Bound on each upstream call; a timed-out category is an error
    /// result, not a fatal error for the iteration
    pub call_timeout: Duration,
    /// TTL for company research (long-lived reference data)
    pub company_ttl_seconds: u64,
    /// TTL for role research
    pub role_ttl_seconds: u64,
    /// TTL for interviewer research (volatile)
    pub interviewer_ttl_seconds: u64,
}

impl LoopConfig {
    /// Create the default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With quality threshold
    #[inline]
    #[must_use]
    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    /// With iteration bound
    #[inline]
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// With per-call timeout
    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Cache TTL for a category
    #[inline]
    #[must_use]
    pub fn ttl_for(&self, category: Category) -> u64 {
        match category {
            Category::Company => self.company_ttl_seconds,
            Category::Role => self.role_ttl_seconds,
            Category::Interviewer => self.interviewer_ttl_seconds,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 0.6,
            max_iterations: 2,
            call_timeout: Duration::from_secs(20),
            company_ttl_seconds: 7 * 24 * 3600,
            role_ttl_seconds: 3 * 24 * 3600,
            interviewer_ttl_seconds: 24 * 3600,
        }
    }
}

/// Cooperative cancellation flag
///
/// Honored between iterations, never mid-iteration: the loop finishes the
/// round in flight, stashes the partials, and reports `Cancelled`.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Create an un-cancelled handle
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    #[inline]
    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

/// Terminal state of one reflection session
#[derive(Debug, Clone, PartialEq)]
pub enum ReflectionOutcome {
    /// Quality cleared the threshold; record is `Prepped`
    Sufficient {
        /// Final quality score
        quality_score: f64,
        /// Final confidence score
        confidence_score: f64,
        /// Completed iterations beyond the first round
        iterations: u32,
    },
    /// Iterations ran out below the threshold; best partials were persisted
    /// anyway and the record is `Prepped` with a warning flag
    Exhausted {
        /// Final (sub-threshold) quality score
        quality_score: f64,
        /// Final confidence score
        confidence_score: f64,
        /// Completed iterations beyond the first round
        iterations: u32,
    },
    /// Cancelled between iterations; partials stashed, record stays
    /// `Preparing` for a later resume
    Cancelled {
        /// Completed iterations beyond the first round
        iterations: u32,
    },
}

/// Reflection loop error
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    /// Store contract or structural failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The record's lifecycle state does not admit research
    #[error("record {id} not preparable from status {status}")]
    NotPreparable {
        /// The record
        id: RecordId,
        /// Its current status
        status: InterviewStatus,
    },
}

/// Drives research for one record until it is good enough or retries run out
pub struct ResearchReflectionLoop {
    store: Arc<InterviewStore>,
    adapter: ResearchCacheAdapter,
    provider: Arc<dyn ResearchProvider>,
    config: LoopConfig,
}

impl ResearchReflectionLoop {
    /// Create a loop over the given collaborators
    #[inline]
    #[must_use]
    pub fn new(
        store: Arc<InterviewStore>,
        adapter: ResearchCacheAdapter,
        provider: Arc<dyn ResearchProvider>,
        config: LoopConfig,
    ) -> Self {
        Self {
            store,
            adapter,
            provider,
            config,
        }
    }

    /// Run one research session for `record_id`
    ///
    /// Acquires the record's session lock for the whole run, moves a `New`
    /// record into `Preparing`, and resumes from stashed partials when an
    /// earlier run was cancelled.
    ///
    /// # Errors
    /// `LoopError::Store` on session/lifecycle violations; per-category
    /// research failures are absorbed into the quality score instead.
    pub async fn run(
        &self,
        record_id: RecordId,
        cancel: &CancelHandle,
    ) -> Result<ReflectionOutcome, LoopError> {
        let _session = self.store.begin_session(record_id)?;

        let record = self.store.get(record_id)?;
        let record = match record.status {
            InterviewStatus::New => self.store.transition(record_id, InterviewStatus::Preparing)?,
            InterviewStatus::Preparing => record,
            status => return Err(LoopError::NotPreparable { id: record_id, status }),
        };

        let mut payload = record
            .research_payload
            .clone()
            .and_then(|value| ResearchPayload::from_value(value).ok())
            .unwrap_or_default();

        let mut iteration = 0u32;
        loop {
            // collecting
            let targets = payload.insufficient_categories();
            if !targets.is_empty() {
                for (category, outcome) in self.collect(&record, &targets).await {
                    match outcome {
                        Ok(findings) => payload.merge_success(category, findings),
                        Err(message) => {
                            tracing::warn!(record = %record_id, %category, %message, "category failed");
                            payload.record_error(category, message);
                        }
                    }
                }
            }

            // evaluating
            let quality = payload.quality_score();
            let confidence = payload.confidence_score();
            tracing::debug!(record = %record_id, iteration, quality, confidence, "round evaluated");

            if quality >= self.config.quality_threshold {
                self.store
                    .attach_research(record_id, payload.to_value(), quality, confidence)?;
                tracing::info!(record = %record_id, iteration, quality, "research sufficient");
                return Ok(ReflectionOutcome::Sufficient {
                    quality_score: quality,
                    confidence_score: confidence,
                    iterations: iteration,
                });
            }

            if iteration >= self.config.max_iterations {
                // Exhausted: keep the best partials and flag the record so
                // downstream consumers warn instead of presenting thin
                // research as complete.
                self.store
                    .attach_research(record_id, payload.to_value(), quality, confidence)?;
                self.store.flag_research_incomplete(record_id)?;
                tracing::warn!(record = %record_id, quality, "research exhausted below threshold");
                return Ok(ReflectionOutcome::Exhausted {
                    quality_score: quality,
                    confidence_score: confidence,
                    iterations: iteration,
                });
            }

            if cancel.is_cancelled() {
                self.store.stash_partial(record_id, payload.to_value())?;
                tracing::info!(record = %record_id, iteration, "research cancelled, partials stashed");
                return Ok(ReflectionOutcome::Cancelled { iterations: iteration });
            }

            iteration += 1;
            tracing::info!(
                record = %record_id,
                iteration,
                targets = ?payload.insufficient_categories(),
                "research below threshold, retrying targeted categories"
            );
        }
    }

    /// Dispatch one round of category calls concurrently
    ///
    /// Results come back keyed by category in dispatch order, so the merge
    /// is deterministic regardless of which task finished first. No shared
    /// state is written during the concurrent phase.
    async fn collect(
        &self,
        record: &InterviewRecord,
        targets: &[Category],
    ) -> Vec<(Category, Result<Vec<Finding>, String>)> {
        let tasks = targets.iter().map(|&category| {
            let adapter = self.adapter.clone();
            let provider = Arc::clone(&self.provider);
            let ttl = self.config.ttl_for(category);
            let timeout = self.config.call_timeout;
            let query = build_query(category, record);
            async move {
                let Some(query) = query else {
                    return (category, Err(format!("no {category} extracted")));
                };
                let call = adapter.call_cached(category, &query, ttl, provider.as_ref());
                match tokio::time::timeout(timeout, call).await {
                    Err(_) => (
                        category,
                        Err(format!("timed out after {}s", timeout.as_secs())),
                    ),
                    Ok(Err(e)) => (category, Err(e.to_string())),
                    Ok(Ok(findings)) => (category, Ok(findings)),
                }
            }
        });
        futures::future::join_all(tasks).await
    }
}

/// Build the upstream query for a category from the record's fields
///
/// `None` when the record lacks the field the category researches; the
/// category is then recorded as an error result for the round.
fn build_query(category: Category, record: &InterviewRecord) -> Option<String> {
    match category {
        Category::Company => record.company.clone(),
        Category::Role => {
            let role = record.role.as_ref()?;
            Some(match &record.company {
                Some(company) => format!("{role} at {company}"),
                None => role.clone(),
            })
        }
        Category::Interviewer => {
            let interviewer = record.interviewer.as_ref()?;
            Some(match &record.company {
                Some(company) => format!("{interviewer} {company}"),
                None => interviewer.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderError, ProviderResponse};
    use async_trait::async_trait;
    use prepd_cache::ExpiringCache;
    use prepd_store::{ExtractedEntities, StoreConfig};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    /// Per-category fixed behavior with call counting
    struct StaticProvider {
        ok: HashMap<Category, Vec<Finding>>,
        calls: AtomicUsize,
    }

    impl StaticProvider {
        fn new(ok: &[(Category, &str)]) -> Self {
            let ok = ok
                .iter()
                .map(|(category, summary)| {
                    (
                        *category,
                        vec![Finding::new(*summary).with_source("https://example.com")],
                    )
                })
                .collect();
            Self {
                ok,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResearchProvider for StaticProvider {
        async fn fetch(
            &self,
            category: Category,
            _query: &str,
        ) -> Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.ok.get(&category) {
                Some(findings) => Ok(ProviderResponse {
                    findings: findings.clone(),
                    cost_estimate: 0.01,
                }),
                None => Err(ProviderError::Upstream("no results".into())),
            }
        }
    }

    struct Harness {
        store: Arc<InterviewStore>,
        reflection: ResearchReflectionLoop,
        _dir: tempfile::TempDir,
    }

    fn harness(provider: Arc<dyn ResearchProvider>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            InterviewStore::open(dir.path().join("store"), StoreConfig::default()).unwrap(),
        );
        let adapter = ResearchCacheAdapter::new(Arc::new(ExpiringCache::in_memory()));
        let reflection = ResearchReflectionLoop::new(
            Arc::clone(&store),
            adapter,
            provider,
            LoopConfig::default(),
        );
        Harness {
            store,
            reflection,
            _dir: dir,
        }
    }

    async fn full_record(store: &InterviewStore) -> RecordId {
        let (record, _) = store
            .lookup_or_create(
                ExtractedEntities::new()
                    .with_company("Acme Corp")
                    .with_role("Backend Engineer")
                    .with_interviewer("J. Lee"),
            )
            .await
            .unwrap();
        record.id
    }

    #[tokio::test]
    async fn company_and_role_are_sufficient_in_one_round() {
        let provider = Arc::new(StaticProvider::new(&[
            (Category::Company, "Acme ships a Rust backend"),
            (Category::Role, "Backend interviews focus on systems design"),
        ]));
        let h = harness(Arc::clone(&provider) as Arc<dyn ResearchProvider>);
        let id = full_record(&h.store).await;

        let outcome = h.reflection.run(id, &CancelHandle::new()).await.unwrap();

        match outcome {
            ReflectionOutcome::Sufficient {
                quality_score,
                iterations,
                ..
            } => {
                assert!((quality_score - 0.8).abs() < 1e-9);
                assert_eq!(iterations, 0);
            }
            other => panic!("expected sufficient, got {other:?}"),
        }

        let record = h.store.get(id).unwrap();
        assert_eq!(record.status, InterviewStatus::Prepped);
        assert_eq!(record.quality_score, Some(0.8));
        assert!(!record.research_incomplete);
    }

    #[tokio::test]
    async fn interviewer_alone_exhausts_and_still_persists() {
        let provider = Arc::new(StaticProvider::new(&[(
            Category::Interviewer,
            "J. Lee leads platform engineering",
        )]));
        let h = harness(Arc::clone(&provider) as Arc<dyn ResearchProvider>);
        let id = full_record(&h.store).await;

        let outcome = h.reflection.run(id, &CancelHandle::new()).await.unwrap();

        match outcome {
            ReflectionOutcome::Exhausted {
                quality_score,
                iterations,
                ..
            } => {
                assert!((quality_score - 0.2).abs() < 1e-9);
                assert_eq!(iterations, 2);
            }
            other => panic!("expected exhausted, got {other:?}"),
        }

        // Forward progress is guaranteed: best partials are persisted and
        // the record still advances, carrying the warning flag.
        let record = h.store.get(id).unwrap();
        assert_eq!(record.status, InterviewStatus::Prepped);
        assert!(record.research_incomplete);
        assert!(record.quality_score.unwrap() < 0.6);
    }

    #[tokio::test]
    async fn retries_target_only_insufficient_categories() {
        let provider = Arc::new(StaticProvider::new(&[
            (Category::Interviewer, "J. Lee leads platform engineering"),
        ]));
        let h = harness(Arc::clone(&provider) as Arc<dyn ResearchProvider>);
        let id = full_record(&h.store).await;

        h.reflection.run(id, &CancelHandle::new()).await.unwrap();

        // Round 0 hits all three; the interviewer result is cached (and
        // sufficient for its slot), so rounds 1 and 2 only re-dispatch
        // company and role: 3 + 2 + 2 upstream calls.
        assert_eq!(provider.calls(), 7);
    }

    #[tokio::test]
    async fn loop_terminates_at_the_bound() {
        // Every category always fails.
        let provider = Arc::new(StaticProvider::new(&[]));
        let h = harness(Arc::clone(&provider) as Arc<dyn ResearchProvider>);
        let id = full_record(&h.store).await;

        let outcome = h.reflection.run(id, &CancelHandle::new()).await.unwrap();

        match outcome {
            ReflectionOutcome::Exhausted {
                quality_score,
                iterations,
                ..
            } => {
                assert_eq!(quality_score, 0.0);
                assert_eq!(iterations, 2);
            }
            other => panic!("expected exhausted, got {other:?}"),
        }
        // max_iterations + 1 rounds, three failing categories each.
        assert_eq!(provider.calls(), 9);
    }

    #[tokio::test]
    async fn cancellation_stashes_partials_between_iterations() {
        let provider = Arc::new(StaticProvider::new(&[(
            Category::Interviewer,
            "J. Lee leads platform engineering",
        )]));
        let h = harness(Arc::clone(&provider) as Arc<dyn ResearchProvider>);
        let id = full_record(&h.store).await;

        let cancel = CancelHandle::new();
        cancel.cancel();
        let outcome = h.reflection.run(id, &cancel).await.unwrap();

        // The round in flight completes; cancellation lands before round 1.
        assert_eq!(outcome, ReflectionOutcome::Cancelled { iterations: 0 });

        let record = h.store.get(id).unwrap();
        assert_eq!(record.status, InterviewStatus::Preparing);
        let payload = ResearchPayload::from_value(record.research_payload.unwrap()).unwrap();
        assert_eq!(payload.covered(), 1);
    }

    #[tokio::test]
    async fn resumed_run_keeps_stashed_partials() {
        let thin = Arc::new(StaticProvider::new(&[(
            Category::Interviewer,
            "J. Lee leads platform engineering",
        )]));
        let h = harness(Arc::clone(&thin) as Arc<dyn ResearchProvider>);
        let id = full_record(&h.store).await;

        let cancel = CancelHandle::new();
        cancel.cancel();
        h.reflection.run(id, &cancel).await.unwrap();

        // A later run with a healthier upstream resumes from the stash and
        // only fetches what is still missing.
        let healthy = Arc::new(StaticProvider::new(&[
            (Category::Company, "Acme ships a Rust backend"),
            (Category::Role, "Backend interviews focus on systems design"),
            (Category::Interviewer, "unused: already stashed"),
        ]));
        let resumed = ResearchReflectionLoop::new(
            Arc::clone(&h.store),
            ResearchCacheAdapter::new(Arc::new(ExpiringCache::in_memory())),
            Arc::clone(&healthy) as Arc<dyn ResearchProvider>,
            LoopConfig::default(),
        );

        let outcome = resumed.run(id, &CancelHandle::new()).await.unwrap();
        assert!(matches!(outcome, ReflectionOutcome::Sufficient { .. }));
        assert_eq!(healthy.calls(), 2);

        let record = h.store.get(id).unwrap();
        assert_eq!(record.status, InterviewStatus::Prepped);
        assert_eq!(record.quality_score, Some(1.0));
    }

    #[tokio::test]
    async fn missing_fields_become_category_errors() {
        let provider = Arc::new(StaticProvider::new(&[
            (Category::Company, "Acme ships a Rust backend"),
            (Category::Role, "Backend interviews focus on systems design"),
        ]));
        let h = harness(Arc::clone(&provider) as Arc<dyn ResearchProvider>);

        let (record, _) = h
            .store
            .lookup_or_create(
                ExtractedEntities::new()
                    .with_company("Acme Corp")
                    .with_role("Backend Engineer"),
            )
            .await
            .unwrap();

        let outcome = h.reflection.run(record.id, &CancelHandle::new()).await.unwrap();

        // No interviewer extracted: the category errors, the rest proceed.
        match outcome {
            ReflectionOutcome::Sufficient { quality_score, confidence_score, .. } => {
                assert!((quality_score - 0.8).abs() < 1e-9);
                assert!(confidence_score < 0.8);
            }
            other => panic!("expected sufficient, got {other:?}"),
        }
        // The interviewer slot never reached the provider.
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn prepped_records_are_not_preparable() {
        let provider = Arc::new(StaticProvider::new(&[
            (Category::Company, "a"),
            (Category::Role, "b"),
        ]));
        let h = harness(Arc::clone(&provider) as Arc<dyn ResearchProvider>);
        let id = full_record(&h.store).await;

        h.reflection.run(id, &CancelHandle::new()).await.unwrap();
        let err = h.reflection.run(id, &CancelHandle::new()).await.unwrap_err();
        assert!(matches!(
            err,
            LoopError::NotPreparable {
                status: InterviewStatus::Prepped,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn concurrent_session_is_rejected() {
        let provider = Arc::new(StaticProvider::new(&[]));
        let h = harness(Arc::clone(&provider) as Arc<dyn ResearchProvider>);
        let id = full_record(&h.store).await;

        let _session = h.store.begin_session(id).unwrap();
        let err = h.reflection.run(id, &CancelHandle::new()).await.unwrap_err();
        assert!(matches!(err, LoopError::Store(StoreError::SessionBusy(_))));
    }
}
