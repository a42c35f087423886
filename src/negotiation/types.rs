//! Negotiation record.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::state::NegotiationState;
use crate::core_types::{ContractId, ProcessId};

/// One record per negotiation attempt created by this provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationRecord {
    /// Provider-assigned id, immutable
    pub own_pid: ProcessId,
    /// Consumer-assigned id for the same negotiation
    pub consumer_pid: String,
    pub partner_id: String,
    /// Partner protocol base URL (callback address of the first request)
    pub partner_dsp_url: String,
    pub target_asset_id: String,
    pub partner_credentials: Option<String>,
    pub state: NegotiationState,
    /// Minted on REQUESTED → AGREED, cleared on termination
    pub contract_id: Option<ContractId>,
    /// The offer node as received, echoed back inside the agreement
    pub offer: Option<Value>,
    /// Store revision for compare-and-swap saves
    pub revision: u64,
}

impl NegotiationRecord {
    pub fn new(
        consumer_pid: impl Into<String>,
        partner_id: impl Into<String>,
        partner_dsp_url: impl Into<String>,
        target_asset_id: impl Into<String>,
    ) -> Self {
        Self {
            own_pid: Uuid::new_v4(),
            consumer_pid: consumer_pid.into(),
            partner_id: partner_id.into(),
            partner_dsp_url: partner_dsp_url.into(),
            target_asset_id: target_asset_id.into(),
            partner_credentials: None,
            state: NegotiationState::Requested,
            contract_id: None,
            offer: None,
            revision: 0,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<String>) -> Self {
        self.partner_credentials = credentials;
        self
    }

    pub fn with_offer(mut self, offer: Value) -> Self {
        self.offer = Some(offer);
        self
    }

    /// The contract-id invariant: present iff the state holds a contract.
    pub fn contract_invariant_holds(&self) -> bool {
        self.contract_id.is_some() == self.state.holds_contract()
    }
}
