//! Contract Negotiation
//!
//! ```text
//! REQUESTED → AGREED → VERIFIED → FINALIZED
//!     ↓          ↓         ↓
//!            TERMINATED
//! ```
//!
//! The provider answers a contract request with REQUESTED, pushes the
//! agreement (AGREED), waits for the consumer's verification (VERIFIED) and
//! pushes the FINALIZED event. Nothing leaves FINALIZED or TERMINATED.

pub mod api;
pub mod machine;
pub mod state;
pub mod types;

pub use machine::NegotiationMachine;
pub use state::NegotiationState;
pub use types::NegotiationRecord;
