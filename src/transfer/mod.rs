//! Transfer Process
//!
//! Grants time-limited access to an asset under a FINALIZED negotiation.
//!
//! # State Machine
//!
//! ```text
//! REQUESTED → STARTED ⇄ SUSPENDED
//!                ↓
//!            COMPLETED
//! (any non-terminal) → TERMINATED
//! ```
//!
//! The STARTED push carries the data address and a bearer token; the
//! consumer renews the token through the refresh endpoint.

pub mod api;
pub mod machine;
pub mod state;
pub mod types;

pub use machine::TransferMachine;
pub use state::TransferState;
pub use types::{TransferFormat, TransferRecord};
