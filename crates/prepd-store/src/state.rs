//! Interview lifecycle state machine
//!
//! `New -> Preparing -> Prepped -> Completed`, with `Archived` reachable
//! from any non-completed state (explicit operator action only) and a
//! `Preparing -> Preparing` self-loop representing a failed or cancelled
//! research run. Status only ever moves forward; an illegal transition is a
//! contract violation and is raised, never silently clamped.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Lifecycle state of an interview record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewStatus {
    /// Just observed, research not started
    New,
    /// Research in progress (or awaiting retry)
    Preparing,
    /// Research attached, ready for guide generation
    Prepped,
    /// Interview happened
    Completed,
    /// Disposed without completing; records are never hard-deleted
    Archived,
}

impl InterviewStatus {
    /// All states, in lifecycle order
    pub const ALL: [InterviewStatus; 5] = [
        InterviewStatus::New,
        InterviewStatus::Preparing,
        InterviewStatus::Prepped,
        InterviewStatus::Completed,
        InterviewStatus::Archived,
    ];

    /// Whether records in this state still need research
    #[inline]
    #[must_use]
    pub fn is_unprepped(self) -> bool {
        matches!(self, InterviewStatus::New | InterviewStatus::Preparing)
    }

    /// Whether this state admits no further transitions
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, InterviewStatus::Completed | InterviewStatus::Archived)
    }
}

impl Display for InterviewStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            InterviewStatus::New => "new",
            InterviewStatus::Preparing => "preparing",
            InterviewStatus::Prepped => "prepped",
            InterviewStatus::Completed => "completed",
            InterviewStatus::Archived => "archived",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for InterviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(InterviewStatus::New),
            "preparing" => Ok(InterviewStatus::Preparing),
            "prepped" => Ok(InterviewStatus::Prepped),
            "completed" => Ok(InterviewStatus::Completed),
            "archived" => Ok(InterviewStatus::Archived),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// States reachable from `from` in a single transition
#[must_use]
pub fn allowed_transitions(from: InterviewStatus) -> Vec<InterviewStatus> {
    use InterviewStatus::*;
    match from {
        New => vec![Preparing, Archived],
        Preparing => vec![Preparing, Prepped, Archived],
        Prepped => vec![Completed, Archived],
        Completed => vec![],
        Archived => vec![],
    }
}

/// Validate a single transition
///
/// # Errors
/// `StoreError::InvalidTransition` when the move is not in the state
/// machine.
pub fn validate_transition(
    from: InterviewStatus,
    to: InterviewStatus,
) -> Result<(), StoreError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition { from, to })
    }
}
