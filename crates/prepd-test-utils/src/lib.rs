//! Testing utilities for the prepd workspace
//!
//! Shared fixtures: scripted research providers, sample extractions, and
//! disk-backed store/cache instances on temporary directories.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use prepd_cache::ExpiringCache;
use prepd_research::{Category, Finding, ProviderError, ProviderResponse, ResearchProvider};
use prepd_store::{ExtractedEntities, InterviewStore, StoreConfig};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// A typical fully extracted interview
pub fn sample_entities() -> ExtractedEntities {
    ExtractedEntities::new()
        .with_company("Acme Corp")
        .with_role("Backend Engineer")
        .with_interviewer("J. Lee")
        .with_source_context("Interview confirmation for Thursday")
}

pub fn cited_finding(summary: &str) -> Finding {
    Finding::new(summary).with_source("https://example.com/source")
}

/// One scripted provider response
#[derive(Debug, Clone)]
pub enum Script {
    Ok(Vec<Finding>),
    Fail(String),
}

/// Research provider driven by per-category scripts
///
/// Queued scripts are consumed call by call; when a category's queue runs
/// dry its default behavior repeats. Defaults to failing every call.
pub struct ScriptedProvider {
    queued: Mutex<HashMap<Category, VecDeque<Script>>>,
    defaults: Mutex<HashMap<Category, Script>>,
    calls: Mutex<Vec<Category>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            queued: Mutex::new(HashMap::new()),
            defaults: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always succeed for `category` with one cited finding
    pub fn succeed(self, category: Category, summary: &str) -> Self {
        self.defaults
            .lock()
            .insert(category, Script::Ok(vec![cited_finding(summary)]));
        self
    }

    /// Always fail for `category`
    pub fn fail(self, category: Category, message: &str) -> Self {
        self.defaults
            .lock()
            .insert(category, Script::Fail(message.into()));
        self
    }

    /// Queue a one-shot response ahead of the default behavior
    pub fn queue(self, category: Category, script: Script) -> Self {
        self.queued
            .lock()
            .entry(category)
            .or_default()
            .push_back(script);
        self
    }

    /// Calls observed so far, in order
    pub fn calls(&self) -> Vec<Category> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, category: Category) -> usize {
        self.calls.lock().iter().filter(|c| **c == category).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResearchProvider for ScriptedProvider {
    async fn fetch(
        &self,
        category: Category,
        _query: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.lock().push(category);

        let script = self
            .queued
            .lock()
            .get_mut(&category)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.defaults.lock().get(&category).cloned())
            .unwrap_or_else(|| Script::Fail("unscripted category".into()));

        match script {
            Script::Ok(findings) => Ok(ProviderResponse {
                findings,
                cost_estimate: 0.01,
            }),
            Script::Fail(message) => Err(ProviderError::Upstream(message)),
        }
    }
}

/// Disk-backed store on a temporary directory
pub fn temp_store() -> (Arc<InterviewStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = InterviewStore::open(dir.path(), StoreConfig::default()).unwrap();
    (Arc::new(store), dir)
}

/// Disk-backed cache on a temporary directory
pub fn temp_cache() -> (Arc<ExpiringCache>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    (Arc::new(ExpiringCache::open(dir.path())), dir)
}
