//! Error types for the interview store
//!
//! Contract violations (bad transitions, concurrent sessions) and
//! structural failures (corrupt files, I/O) are raised; they are never
//! absorbed into quality signal the way per-category research failures are.

use crate::record::RecordId;
use crate::state::InterviewStatus;
use std::path::PathBuf;

/// Store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Attempted lifecycle move not in the state machine
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: InterviewStatus,
        /// Requested status
        to: InterviewStatus,
    },

    /// No record with the given id
    #[error("record not found: {0}")]
    NotFound(RecordId),

    /// A research session already holds the record's advisory lock
    #[error("research session already active for record {0}")]
    SessionBusy(RecordId),

    /// A directly requested record file could not be decoded
    #[error("corrupt record file: {path}")]
    CorruptRecord {
        /// Offending file
        path: PathBuf,
        /// Decode failure
        #[source]
        source: serde_json::Error,
    },

    /// Filesystem failure
    #[error("store i/o: {0}")]
    Io(#[from] std::io::Error),
}
