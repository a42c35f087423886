//! Partner HTTP client.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

use crate::error::DispatchError;

#[async_trait]
pub trait PartnerClient: Send + Sync {
    /// POST `body` to `url` with a bearer credential. Any 2xx is success.
    async fn post(&self, url: &str, bearer: &str, body: Vec<u8>) -> Result<(), DispatchError>;
}

pub struct HttpPartnerClient {
    client: reqwest::Client,
}

impl HttpPartnerClient {
    pub fn new(timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PartnerClient for HttpPartnerClient {
    async fn post(&self, url: &str, bearer: &str, body: Vec<u8>) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(bearer)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(format!("POST {} failed: {}", url, e)))?;

        let status = response.status();
        debug!(url = %url, status = status.as_u16(), "Partner responded");
        if status.is_success() {
            Ok(())
        } else {
            Err(DispatchError::PartnerStatus(status.as_u16()))
        }
    }
}


#[cfg(test)]
pub use mock::MockPartnerClient;
