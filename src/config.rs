use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    /// Known partners and their bearer credentials
    #[serde(default)]
    pub partners: Vec<PartnerConfig>,
    /// Negotiable assets and their expected offers
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

/// This provider's own identity and URLs
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    pub participant_id: String,
    /// Protocol base URL partners reach us on
    pub dsp_url: String,
    /// Base URL of the data plane serving datasets
    pub data_plane_url: String,
}

/// Capability token lifetimes
///
/// The rotation interval must exceed every validity window so that no token
/// outlives two key rotations.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenConfig {
    pub issuer: String,
    pub access_validity_secs: u64,
    pub refresh_validity_secs: u64,
    pub rotation_interval_secs: u64,
    pub leeway_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "dsp-provider".to_string(),
            access_validity_secs: 300,
            refresh_validity_secs: 900,
            rotation_interval_secs: 1800,
            leeway_secs: 5,
        }
    }
}

impl TokenConfig {
    pub fn access_validity(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.access_validity_secs as i64)
    }

    pub fn refresh_validity(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_validity_secs as i64)
    }

    pub fn rotation_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.rotation_interval_secs as i64)
    }
}

/// Callback dispatcher pool
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DispatcherConfig {
    pub workers: usize,
    pub queue_size: usize,
    pub http_timeout_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_size: 1024,
            http_timeout_ms: 10_000,
        }
    }
}

impl DispatcherConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PartnerConfig {
    pub partner_id: String,
    /// Bearer token the partner presents to us
    pub inbound_token: String,
    /// Bearer token we present on callbacks
    #[serde(default)]
    pub outbound_token: Option<String>,
    /// Membership/credential descriptor captured on records
    #[serde(default)]
    pub credentials: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AssetConfig {
    pub asset_id: String,
    pub dataset_id: Uuid,
    /// Offer every partner must present, compact form
    #[serde(default)]
    pub offer: Option<Value>,
    /// Partner-specific offers overriding `offer`
    #[serde(default)]
    pub partner_offers: HashMap<String, Value>,
}

impl AppConfig {
    /// Load `config/{env}.yaml`
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.participant_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "provider.participant_id must not be empty".into(),
            ));
        }
        let token = &self.token;
        if token.rotation_interval_secs <= token.access_validity_secs
            || token.rotation_interval_secs <= token.refresh_validity_secs
        {
            return Err(ConfigError::Invalid(format!(
                "token.rotation_interval_secs ({}) must exceed access ({}) and refresh ({}) validity",
                token.rotation_interval_secs,
                token.access_validity_secs,
                token.refresh_validity_secs
            )));
        }
        if self.dispatcher.workers == 0 {
            return Err(ConfigError::Invalid("dispatcher.workers must be >= 1".into()));
        }
        if self.dispatcher.queue_size == 0 {
            return Err(ConfigError::Invalid("dispatcher.queue_size must be >= 1".into()));
        }
        Ok(())
    }
}
