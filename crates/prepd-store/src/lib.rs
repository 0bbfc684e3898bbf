//! prepd-store — persistent interview repository
//!
//! The system of record for observed interviews:
//! - Deduplicates on insert via similarity scoring, never by exact string
//! - Tracks each interview's lifecycle through a validated state machine
//! - Persists one JSON file per record so corruption cannot cascade
//! - Serializes research sessions per record with advisory locks

#![warn(unreachable_pub)]

pub mod error;
pub mod record;
pub mod state;
pub mod store;

pub use error::StoreError;
pub use record::{ExtractedEntities, InterviewRecord, RecordId, StatusChange};
pub use state::{allowed_transitions, validate_transition, InterviewStatus};
pub use store::{InterviewStore, SessionLock, StoreConfig};
