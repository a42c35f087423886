//! Record Stores
//!
//! The state machines persist through these traits. No transactional
//! guarantee is assumed beyond an atomic single-record save; implementations
//! must reject a save whose `revision` no longer matches the stored one so
//! that racing read-modify-write cycles surface as `StoreError::Conflict`
//! instead of silently overwriting each other.

pub mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;

use crate::core_types::{ContractId, ProcessId};
use crate::error::StoreError;
use crate::negotiation::NegotiationRecord;
use crate::transfer::TransferRecord;

#[async_trait]
pub trait NegotiationStore: Send + Sync {
    /// Insert or update; returns the stored record with its new revision.
    async fn save(&self, record: NegotiationRecord) -> Result<NegotiationRecord, StoreError>;

    async fn find_by_id(&self, own_pid: ProcessId) -> Result<Option<NegotiationRecord>, StoreError>;

    async fn find_all_by_contract_id(
        &self,
        contract_id: ContractId,
    ) -> Result<Vec<NegotiationRecord>, StoreError>;
}

#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Insert or update; returns the stored record with its new revision.
    async fn save(&self, record: TransferRecord) -> Result<TransferRecord, StoreError>;

    async fn find_by_id(&self, own_pid: ProcessId) -> Result<Option<TransferRecord>, StoreError>;
}
