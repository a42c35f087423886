//! Collaborator Adapters
//!
//! The engine talks to identity, policy, catalog and credential services
//! through these traits. The `Static*` implementations are backed by the
//! application config.

pub mod catalog;
pub mod identity;
pub mod offers;

pub use catalog::StaticAssetCatalog;
pub use identity::{StaticIdentityValidator, StaticPartnerTokenProvider};
pub use offers::StaticOfferValidator;

use async_trait::async_trait;
use serde_json::Value;

use crate::core_types::DatasetId;

/// Caller identity established from the request credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerIdentity {
    pub partner_id: String,
    /// Membership/credential descriptor captured on new records
    pub credentials: Option<String>,
}

#[async_trait]
pub trait IdentityValidator: Send + Sync {
    /// Resolve the `Authorization` header value to a partner.
    async fn resolve(&self, authorization: Option<&str>) -> Option<PartnerIdentity>;
}

#[async_trait]
pub trait OfferValidator: Send + Sync {
    /// Check a requested offer (compact form) for `target_asset_id` on
    /// behalf of `partner_id`. `Err` carries the reason reported back.
    async fn validate_offer(
        &self,
        offer: &Value,
        target_asset_id: &str,
        partner_id: &str,
    ) -> Result<(), String>;
}

#[async_trait]
pub trait AssetResolver: Send + Sync {
    /// Dataset behind a negotiated asset.
    async fn resolve_dataset(&self, target_asset_id: &str) -> Option<DatasetId>;

    /// URL the consumer uses to reach the dataset.
    async fn dataset_address(&self, dataset_id: DatasetId) -> Option<String>;
}

#[async_trait]
pub trait PartnerTokenProvider: Send + Sync {
    /// Bearer credential to present on callbacks to `partner_id`.
    async fn provide_token_for_partner(&self, partner_id: &str) -> Option<String>;
}
