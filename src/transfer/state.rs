//! Transfer Process States
//!
//! ```text
//! REQUESTED → STARTED ⇄ SUSPENDED
//!     ↓          ↓          ↓
//!            COMPLETED
//!           TERMINATED
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transfer FSM States
///
/// Terminal states: COMPLETED, TERMINATED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferState {
    /// Request accepted, start notification pending
    Requested,
    /// Consumer holds an endpoint and token
    Started,
    /// Paused by either side, may resume
    Suspended,
    /// Terminal: transfer done
    Completed,
    /// Terminal: transfer aborted
    Terminated,
}

impl TransferState {
    pub const ALL: [TransferState; 5] = [
        TransferState::Requested,
        TransferState::Started,
        TransferState::Suspended,
        TransferState::Completed,
        TransferState::Terminated,
    ];

    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Terminated)
    }

    /// Allowed successor states
    pub fn successors(&self) -> &'static [TransferState] {
        use TransferState::*;
        match self {
            Requested => &[Started, Terminated],
            Suspended => &[Started, Terminated],
            Started => &[Suspended, Completed, Terminated],
            Completed | Terminated => &[],
        }
    }

    #[inline]
    pub fn can_transition_to(&self, next: TransferState) -> bool {
        self.successors().contains(&next)
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Requested => "REQUESTED",
            TransferState::Started => "STARTED",
            TransferState::Suspended => "SUSPENDED",
            TransferState::Completed => "COMPLETED",
            TransferState::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransferState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransferState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or(())
    }
}
