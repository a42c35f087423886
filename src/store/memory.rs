//! In-memory record store backed by `DashMap`.
//!
//! Saves are compare-and-swap on `revision`: a record loaded at revision N
//! can only be written back while the stored copy is still at N.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{NegotiationStore, TransferStore};
use crate::core_types::{ContractId, ProcessId};
use crate::error::StoreError;
use crate::negotiation::NegotiationRecord;
use crate::transfer::TransferRecord;

/// Thread-safe store for both record kinds.
#[derive(Default)]
pub struct InMemoryStore {
    negotiations: DashMap<ProcessId, NegotiationRecord>,
    transfers: DashMap<ProcessId, TransferRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn negotiation_count(&self) -> usize {
        self.negotiations.len()
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers.len()
    }
}

/// CAS insert shared by both maps.
fn cas_save<R: Clone>(
    map: &DashMap<ProcessId, R>,
    id: ProcessId,
    mut record: R,
    revision: impl Fn(&R) -> u64,
    bump: impl Fn(&mut R),
) -> Result<R, StoreError> {
    match map.entry(id) {
        Entry::Occupied(mut entry) => {
            if revision(entry.get()) != revision(&record) {
                return Err(StoreError::Conflict { id: id.to_string() });
            }
            bump(&mut record);
            entry.insert(record.clone());
            Ok(record)
        }
        Entry::Vacant(entry) => {
            // A non-zero revision means the caller loaded a record that is gone
            if revision(&record) != 0 {
                return Err(StoreError::Conflict { id: id.to_string() });
            }
            bump(&mut record);
            entry.insert(record.clone());
            Ok(record)
        }
    }
}

#[async_trait]
impl NegotiationStore for InMemoryStore {
    async fn save(&self, record: NegotiationRecord) -> Result<NegotiationRecord, StoreError> {
        cas_save(
            &self.negotiations,
            record.own_pid,
            record,
            |r| r.revision,
            |r| r.revision += 1,
        )
    }

    async fn find_by_id(&self, own_pid: ProcessId) -> Result<Option<NegotiationRecord>, StoreError> {
        Ok(self.negotiations.get(&own_pid).map(|r| r.value().clone()))
    }

    async fn find_all_by_contract_id(
        &self,
        contract_id: ContractId,
    ) -> Result<Vec<NegotiationRecord>, StoreError> {
        Ok(self
            .negotiations
            .iter()
            .filter(|r| r.contract_id == Some(contract_id))
            .map(|r| r.value().clone())
            .collect())
    }
}

#[async_trait]
impl TransferStore for InMemoryStore {
    async fn save(&self, record: TransferRecord) -> Result<TransferRecord, StoreError> {
        cas_save(
            &self.transfers,
            record.own_pid,
            record,
            |r| r.revision,
            |r| r.revision += 1,
        )
    }

    async fn find_by_id(&self, own_pid: ProcessId) -> Result<Option<TransferRecord>, StoreError> {
        Ok(self.transfers.get(&own_pid).map(|r| r.value().clone()))
    }
}
