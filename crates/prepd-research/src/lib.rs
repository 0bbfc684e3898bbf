//! prepd-research — cached research calls and the reflection loop
//!
//! Drives research for one interview record at a time:
//! - All upstream calls go through an expiring cache keyed by a normalized
//!   request fingerprint
//! - A bounded reflection loop re-attempts insufficient categories until the
//!   accumulated evidence clears a quality threshold or iterations run out
//! - The best partial result is always persisted; a record is never stuck
//!   indefinitely in `preparing`

#![warn(unreachable_pub)]

pub mod adapter;
pub mod payload;
pub mod provider;
pub mod reflection;

pub use adapter::ResearchCacheAdapter;
pub use payload::{CategoryFindings, ResearchPayload};
pub use provider::{Category, Finding, ProviderError, ProviderResponse, ResearchProvider};
pub use reflection::{
    CancelHandle, LoopConfig, LoopError, ReflectionOutcome, ResearchReflectionLoop,
};
