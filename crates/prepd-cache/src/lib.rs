//! prepd-cache — expiring response cache
//!
//! Disk-backed key/value store for expensive research and generation calls:
//! - Per-entry time-to-live supplied by the caller
//! - Hit/miss/cost accounting for aggregate savings reporting
//! - One JSON file per key; a corrupted file degrades to a miss
//!
//! The cache is deliberately never a single point of failure: if the backing
//! directory is unavailable it runs memory-only, and callers fall back to
//! the upstream source on a miss.

#![warn(unreachable_pub)]

pub mod cache;
pub mod entry;
pub mod fingerprint;

pub use cache::{CacheStats, ExpiringCache};
pub use entry::CacheEntry;
pub use fingerprint::Fingerprint;
