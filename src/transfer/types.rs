//! Transfer Core Types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::state::TransferState;
use crate::core_types::{DatasetId, ProcessId};

/// Transfer mode requested by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferFormat {
    /// Consumer pulls the dataset over HTTP (read grant)
    HttpPull,
    /// Consumer writes to the dataset over HTTP (write grant)
    HttpWrite,
}

impl TransferFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferFormat::HttpPull => "HttpData-PULL",
            TransferFormat::HttpWrite => "HttpData-WRITE",
        }
    }
}

impl fmt::Display for TransferFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransferFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HttpData-PULL" => Ok(TransferFormat::HttpPull),
            "HttpData-WRITE" => Ok(TransferFormat::HttpWrite),
            _ => Err(()),
        }
    }
}

/// One record per transfer process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub own_pid: ProcessId,
    pub consumer_pid: String,
    pub partner_id: String,
    pub partner_dsp_url: String,
    pub partner_credentials: Option<String>,
    /// Agreement id of the finalized negotiation, as sent by the consumer
    pub contract_id: String,
    /// Set once after creation
    pub dataset_id: Option<DatasetId>,
    /// Raw format string from the request
    pub format: String,
    /// Set together with STARTED
    pub dataset_address_url: Option<String>,
    pub state: TransferState,
    pub revision: u64,
}

impl TransferRecord {
    pub fn new(
        consumer_pid: impl Into<String>,
        partner_id: impl Into<String>,
        partner_dsp_url: impl Into<String>,
        contract_id: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            own_pid: Uuid::new_v4(),
            consumer_pid: consumer_pid.into(),
            partner_id: partner_id.into(),
            partner_dsp_url: partner_dsp_url.into(),
            partner_credentials: None,
            contract_id: contract_id.into(),
            dataset_id: None,
            format: format.into(),
            dataset_address_url: None,
            state: TransferState::Requested,
            revision: 0,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<String>) -> Self {
        self.partner_credentials = credentials;
        self
    }

    /// Parsed transfer format, if supported
    pub fn transfer_format(&self) -> Option<TransferFormat> {
        self.format.parse().ok()
    }
}
