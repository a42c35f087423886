//! Contract Negotiation States
//!
//! ```text
//! REQUESTED → AGREED → VERIFIED → FINALIZED
//!     ↓          ↓         ↓
//!           TERMINATED
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Negotiation FSM states.
///
/// Terminal states: FINALIZED, TERMINATED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NegotiationState {
    /// Consumer sent a contract request, offer accepted for evaluation
    Requested,
    /// Provider sent the agreement; contract id minted
    Agreed,
    /// Consumer verified the agreement
    Verified,
    /// Terminal: provider confirmed, agreement in force
    Finalized,
    /// Terminal: negotiation aborted by either side
    Terminated,
}

impl NegotiationState {
    pub const ALL: [NegotiationState; 5] = [
        NegotiationState::Requested,
        NegotiationState::Agreed,
        NegotiationState::Verified,
        NegotiationState::Finalized,
        NegotiationState::Terminated,
    ];

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, NegotiationState::Finalized | NegotiationState::Terminated)
    }

    /// Whether a record in this state carries a contract id.
    #[inline]
    pub fn holds_contract(&self) -> bool {
        matches!(
            self,
            NegotiationState::Agreed | NegotiationState::Verified | NegotiationState::Finalized
        )
    }

    /// Transition table
    pub fn can_transition_to(&self, next: NegotiationState) -> bool {
        use NegotiationState::*;
        match (self, next) {
            (Requested, Agreed) | (Agreed, Verified) | (Verified, Finalized) => true,
            (from, Terminated) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationState::Requested => "REQUESTED",
            NegotiationState::Agreed => "AGREED",
            NegotiationState::Verified => "VERIFIED",
            NegotiationState::Finalized => "FINALIZED",
            NegotiationState::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NegotiationState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NegotiationState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use NegotiationState::*;

    #[test]
    fn test_terminal_states() {
        assert!(Finalized.is_terminal());
        assert!(Terminated.is_terminal());
        assert!(!Requested.is_terminal());
        assert!(!Agreed.is_terminal());
        assert!(!Verified.is_terminal());
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(Requested.can_transition_to(Agreed));
        assert!(Agreed.can_transition_to(Verified));
        assert!(Verified.can_transition_to(Finalized));
    }

    #[test]
    fn test_termination_from_non_terminal_only() {
        for state in NegotiationState::ALL {
            assert_eq!(state.can_transition_to(Terminated), !state.is_terminal());
        }
    }

    #[test]
    fn test_nothing_leaves_terminal_states() {
        for next in NegotiationState::ALL {
            assert!(!Finalized.can_transition_to(next));
            assert!(!Terminated.can_transition_to(next));
        }
    }

    #[test]
    fn test_no_skipping() {
        assert!(!Requested.can_transition_to(Verified));
        assert!(!Requested.can_transition_to(Finalized));
        assert!(!Agreed.can_transition_to(Finalized));
        assert!(!Agreed.can_transition_to(Agreed));
    }

    #[test]
    fn test_parse_display() {
        for state in NegotiationState::ALL {
            assert_eq!(state.to_string().parse::<NegotiationState>(), Ok(state));
        }
        assert!("PENDING".parse::<NegotiationState>().is_err());
    }
}
