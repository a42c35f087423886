//! DSP Provider - Dataspace Protocol engine, provider side
//!
//! Runs contract negotiations and transfer processes for consumers, issues
//! short-lived capability tokens for the agreed data, and pushes the
//! provider-side callbacks asynchronously.
//!
//! # Modules
//!
//! - [`core_types`] - Process id aliases and `urn:uuid:` formatting
//! - [`codec`] - Protocol versions and the wire format of every message
//! - [`negotiation`] - Contract negotiation state machine and handlers
//! - [`transfer`] - Transfer process state machine and handlers
//! - [`token`] - Capability token issuing, rotation and validation
//! - [`dispatch`] - Outbound callback queue and worker pool
//! - [`adapters`] - Identity, offer, catalog and credential collaborators
//! - [`store`] - Record persistence
//! - [`engine`] - Wiring of all of the above
//! - [`gateway`] - HTTP binding

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod error;
pub mod logging;

pub mod adapters;
pub mod codec;
pub mod dispatch;
pub mod engine;
pub mod gateway;
pub mod negotiation;
pub mod store;
pub mod token;
pub mod transfer;

#[cfg(test)]
mod integration_tests;

// Convenient re-exports at crate root
pub use codec::ProtocolVersion;
pub use config::AppConfig;
pub use core_types::{ContractId, DatasetId, ProcessId};
pub use engine::{Collaborators, ProtocolEngine, ProtocolResponse};
pub use error::{DispatchError, ProtocolError, StateError, StoreError};
pub use negotiation::{NegotiationMachine, NegotiationRecord, NegotiationState};
pub use token::{AccessTokenValidator, TokenService};
pub use transfer::{TransferMachine, TransferRecord, TransferState};
