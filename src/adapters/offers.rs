//! Config-backed offer validation.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use super::OfferValidator;
use crate::codec::policy::policies_match;
use crate::config::AssetConfig;

/// Compares requested offers against the offers configured per asset.
///
/// A partner-specific offer takes precedence over the asset's general
/// offer. An asset with no configured offer accepts any offer that targets
/// it.
pub struct StaticOfferValidator {
    assets: HashMap<String, AssetConfig>,
}

impl StaticOfferValidator {
    pub fn new(assets: &[AssetConfig]) -> Self {
        Self {
            assets: assets.iter().map(|a| (a.asset_id.clone(), a.clone())).collect(),
        }
    }
}

#[async_trait]
impl OfferValidator for StaticOfferValidator {
    async fn validate_offer(
        &self,
        offer: &Value,
        target_asset_id: &str,
        partner_id: &str,
    ) -> Result<(), String> {
        let asset = self
            .assets
            .get(target_asset_id)
            .ok_or_else(|| format!("unknown asset {}", target_asset_id))?;

        if offer.get("target").and_then(Value::as_str) != Some(target_asset_id) {
            return Err(format!("offer does not target {}", target_asset_id));
        }

        let expected = asset
            .partner_offers
            .get(partner_id)
            .or(asset.offer.as_ref());
        match expected {
            Some(expected) if !policies_match(expected, offer) => {
                debug!(asset = %target_asset_id, partner = %partner_id, "Offer mismatch");
                Err(format!("offer does not match the offer for {}", target_asset_id))
            }
            _ => Ok(()),
        }
    }
}
