//! Negotiation State Machine
//!
//! Owns the `NegotiationRecord` lifecycle. Every mutation is a
//! load → validate → save cycle against the store; the store's revision
//! check serializes racing writers on the same record.

use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::state::NegotiationState;
use super::types::NegotiationRecord;
use crate::core_types::{ContractId, ProcessId};
use crate::error::StateError;
use crate::store::NegotiationStore;

pub struct NegotiationMachine {
    store: Arc<dyn NegotiationStore>,
}

impl NegotiationMachine {
    pub fn new(store: Arc<dyn NegotiationStore>) -> Self {
        Self { store }
    }

    /// Allocate a new negotiation in REQUESTED.
    ///
    /// No validation happens here; the protocol handler validates the offer
    /// around this call.
    pub async fn create_negotiation(
        &self,
        consumer_pid: &str,
        partner_id: &str,
        partner_dsp_url: &str,
        target_asset_id: &str,
    ) -> Result<NegotiationRecord, StateError> {
        self.create(NegotiationRecord::new(
            consumer_pid,
            partner_id,
            partner_dsp_url,
            target_asset_id,
        ))
        .await
    }

    /// Persist a freshly built record (state REQUESTED, revision 0).
    pub async fn create(&self, record: NegotiationRecord) -> Result<NegotiationRecord, StateError> {
        debug_assert_eq!(record.state, NegotiationState::Requested);
        let record = self.store.save(record).await?;
        info!(
            own_pid = %record.own_pid,
            consumer_pid = %record.consumer_pid,
            partner_id = %record.partner_id,
            target = %record.target_asset_id,
            "Negotiation created"
        );
        Ok(record)
    }

    /// Move a negotiation to `target`.
    ///
    /// AGREED mints the contract id; TERMINATED clears it.
    pub async fn transition(
        &self,
        own_pid: ProcessId,
        target: NegotiationState,
    ) -> Result<NegotiationRecord, StateError> {
        let mut record = self
            .store
            .find_by_id(own_pid)
            .await?
            .ok_or_else(|| StateError::NotFound(own_pid.to_string()))?;

        if !record.state.can_transition_to(target) {
            warn!(
                own_pid = %own_pid,
                from = %record.state,
                to = %target,
                "Rejected negotiation transition"
            );
            return Err(StateError::invalid(record.state, target));
        }

        let from = record.state;
        match target {
            NegotiationState::Agreed => {
                record.contract_id = Some(self.mint_contract_id().await?);
            }
            NegotiationState::Terminated => {
                record.contract_id = None;
            }
            _ => {}
        }
        record.state = target;

        let record = self.store.save(record).await?;
        info!(
            own_pid = %own_pid,
            from = %from,
            to = %target,
            contract_id = ?record.contract_id,
            "Negotiation transitioned"
        );
        Ok(record)
    }

    /// Terminate unless already terminal. Never fails; used on error paths
    /// where the original failure is what gets reported.
    pub async fn force_terminate(&self, own_pid: ProcessId) -> Option<NegotiationRecord> {
        match self.transition(own_pid, NegotiationState::Terminated).await {
            Ok(record) => Some(record),
            Err(StateError::InvalidTransition { from, .. }) => {
                debug!(own_pid = %own_pid, state = %from, "Negotiation already terminal");
                None
            }
            Err(e) => {
                error!(own_pid = %own_pid, error = %e, "Failed to terminate negotiation");
                None
            }
        }
    }

    pub async fn find_by_id(
        &self,
        own_pid: ProcessId,
    ) -> Result<Option<NegotiationRecord>, StateError> {
        Ok(self.store.find_by_id(own_pid).await?)
    }

    /// Look up a negotiation by its agreement id.
    ///
    /// Duplicates should be impossible; if the store returns several anyway,
    /// the first one wins and the anomaly is logged.
    pub async fn find_by_contract_id(
        &self,
        contract_id: ContractId,
    ) -> Result<Option<NegotiationRecord>, StateError> {
        let mut records = self.store.find_all_by_contract_id(contract_id).await?;
        if records.len() > 1 {
            error!(
                contract_id = %contract_id,
                count = records.len(),
                "Multiple negotiations share one contract id"
            );
        }
        Ok(if records.is_empty() {
            None
        } else {
            Some(records.swap_remove(0))
        })
    }

    /// Generate a contract id not held by any record.
    async fn mint_contract_id(&self) -> Result<ContractId, StateError> {
        loop {
            let candidate = Uuid::new_v4();
            if self
                .store
                .find_all_by_contract_id(candidate)
                .await?
                .is_empty()
            {
                return Ok(candidate);
            }
            warn!(contract_id = %candidate, "Contract id collision, regenerating");
        }
    }
}
