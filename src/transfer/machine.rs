//! Transfer State Machine
//!
//! Owns the `TransferRecord` lifecycle and enforces the transition table in
//! [`TransferState::successors`].

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::state::TransferState;
use super::types::TransferRecord;
use crate::core_types::{DatasetId, ProcessId};
use crate::error::StateError;
use crate::store::TransferStore;

pub struct TransferMachine {
    store: Arc<dyn TransferStore>,
}

impl TransferMachine {
    pub fn new(store: Arc<dyn TransferStore>) -> Self {
        Self { store }
    }

    /// Persist a new transfer record.
    ///
    /// The record is normally REQUESTED; a request that fails validation is
    /// stored directly as TERMINATED.
    pub async fn create_transfer(&self, record: TransferRecord) -> Result<TransferRecord, StateError> {
        let record = self.store.save(record).await?;
        info!(
            own_pid = %record.own_pid,
            consumer_pid = %record.consumer_pid,
            partner_id = %record.partner_id,
            contract_id = %record.contract_id,
            state = %record.state,
            "Transfer created"
        );
        Ok(record)
    }

    async fn load(&self, own_pid: ProcessId) -> Result<TransferRecord, StateError> {
        self.store
            .find_by_id(own_pid)
            .await?
            .ok_or_else(|| StateError::NotFound(own_pid.to_string()))
    }

    fn check(record: &TransferRecord, next: TransferState) -> Result<(), StateError> {
        if record.state.can_transition_to(next) {
            Ok(())
        } else {
            warn!(
                own_pid = %record.own_pid,
                from = %record.state,
                to = %next,
                "Rejected transfer transition"
            );
            Err(StateError::invalid(record.state, next))
        }
    }

    pub async fn transition(
        &self,
        own_pid: ProcessId,
        next: TransferState,
    ) -> Result<TransferRecord, StateError> {
        let mut record = self.load(own_pid).await?;
        Self::check(&record, next)?;

        let from = record.state;
        record.state = next;
        let record = self.store.save(record).await?;
        info!(own_pid = %own_pid, from = %from, to = %next, "Transfer transitioned");
        Ok(record)
    }

    /// Record the dataset resolved from the negotiated asset. Set once.
    pub async fn attach_dataset(
        &self,
        own_pid: ProcessId,
        dataset_id: DatasetId,
    ) -> Result<TransferRecord, StateError> {
        let mut record = self.load(own_pid).await?;
        if let Some(existing) = record.dataset_id {
            if existing == dataset_id {
                return Ok(record);
            }
            return Err(StateError::invalid(
                format!("dataset {}", existing),
                format!("dataset {}", dataset_id),
            ));
        }
        record.dataset_id = Some(dataset_id);
        let record = self.store.save(record).await?;
        debug!(own_pid = %own_pid, dataset_id = %dataset_id, "Dataset attached");
        Ok(record)
    }

    /// STARTED plus the dataset address, in one save.
    pub async fn start(
        &self,
        own_pid: ProcessId,
        dataset_address_url: &str,
    ) -> Result<TransferRecord, StateError> {
        let mut record = self.load(own_pid).await?;
        Self::check(&record, TransferState::Started)?;

        let from = record.state;
        record.state = TransferState::Started;
        record.dataset_address_url = Some(dataset_address_url.to_string());
        let record = self.store.save(record).await?;
        info!(
            own_pid = %own_pid,
            from = %from,
            address = %dataset_address_url,
            "Transfer started"
        );
        Ok(record)
    }

    /// Terminate unless already terminal. Never fails.
    pub async fn force_terminate(&self, own_pid: ProcessId) -> Option<TransferRecord> {
        match self.transition(own_pid, TransferState::Terminated).await {
            Ok(record) => Some(record),
            Err(StateError::InvalidTransition { from, .. }) => {
                debug!(own_pid = %own_pid, state = %from, "Transfer already terminal");
                None
            }
            Err(e) => {
                error!(own_pid = %own_pid, error = %e, "Failed to terminate transfer");
                None
            }
        }
    }

    pub async fn find_by_id(&self, own_pid: ProcessId) -> Result<Option<TransferRecord>, StateError> {
        Ok(self.store.find_by_id(own_pid).await?)
    }
}
