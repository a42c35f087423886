//! Config-backed asset catalog.

use async_trait::async_trait;
use std::collections::HashMap;

use super::AssetResolver;
use crate::config::AssetConfig;
use crate::core_types::DatasetId;

pub struct StaticAssetCatalog {
    datasets: HashMap<String, DatasetId>,
    data_plane_url: String,
}

impl StaticAssetCatalog {
    pub fn new(assets: &[AssetConfig], data_plane_url: &str) -> Self {
        Self {
            datasets: assets
                .iter()
                .map(|a| (a.asset_id.clone(), a.dataset_id))
                .collect(),
            data_plane_url: data_plane_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AssetResolver for StaticAssetCatalog {
    async fn resolve_dataset(&self, target_asset_id: &str) -> Option<DatasetId> {
        self.datasets.get(target_asset_id).copied()
    }

    async fn dataset_address(&self, dataset_id: DatasetId) -> Option<String> {
        self.datasets
            .values()
            .any(|id| *id == dataset_id)
            .then(|| format!("{}/datasets/{}", self.data_plane_url, dataset_id))
    }
}
