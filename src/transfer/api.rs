//! Transfer protocol handlers

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::state::TransferState;
use super::types::{TransferFormat, TransferRecord};
use crate::adapters::PartnerIdentity;
use crate::codec::{
    self, ProcessInterruption, ProtocolVersion, TransferCompletionMessage, TransferProcess,
    TransferRequestMessage, TransferStartMessage, TransferSuspensionMessage,
    TransferTerminationMessage,
};
use crate::core_types::{DatasetId, format_pid, parse_pid, same_pid};
use crate::dispatch::{DispatchKind, DispatchTask};
use crate::engine::{Failure, ProtocolEngine, ProtocolResponse};
use crate::error::ProtocolError;
use crate::negotiation::NegotiationState;
use crate::token::TokenKind;

/// Body of `POST /transfers/token/refresh`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub token_type: String,
}

fn ack(version: ProtocolVersion, status: StatusCode, record: &TransferRecord) -> ProtocolResponse {
    ProtocolResponse::message(
        status,
        version,
        &TransferProcess {
            provider_pid: format_pid(record.own_pid),
            consumer_pid: record.consumer_pid.clone(),
            state: record.state,
        },
    )
}

fn pids(record: &TransferRecord) -> (Option<String>, Option<String>) {
    (Some(format_pid(record.own_pid)), Some(record.consumer_pid.clone()))
}

/// Consumer messages that move an existing transfer.
enum ConsumerMessage {
    Start,
    Completion,
    Suspension,
    Termination,
}

impl ConsumerMessage {
    fn target(&self) -> TransferState {
        match self {
            ConsumerMessage::Start => TransferState::Started,
            ConsumerMessage::Completion => TransferState::Completed,
            ConsumerMessage::Suspension => TransferState::Suspended,
            ConsumerMessage::Termination => TransferState::Terminated,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ConsumerMessage::Start => "TransferStartMessage",
            ConsumerMessage::Completion => "TransferCompletionMessage",
            ConsumerMessage::Suspension => "TransferSuspensionMessage",
            ConsumerMessage::Termination => "TransferTerminationMessage",
        }
    }

    /// Ids carried by the body, or `None` if it does not decode.
    fn decode_pids(&self, version: ProtocolVersion, body: &[u8]) -> Option<(String, String)> {
        let interruption = |m: ProcessInterruption| (m.provider_pid, m.consumer_pid);
        match self {
            ConsumerMessage::Start => codec::decode::<TransferStartMessage>(version, body)
                .map(|m| (m.provider_pid, m.consumer_pid)),
            ConsumerMessage::Completion => codec::decode::<TransferCompletionMessage>(version, body)
                .map(|m| (m.provider_pid, m.consumer_pid)),
            ConsumerMessage::Suspension => codec::decode::<TransferSuspensionMessage>(version, body)
                .map(|m| interruption(m.0)),
            ConsumerMessage::Termination => {
                codec::decode::<TransferTerminationMessage>(version, body).map(|m| interruption(m.0))
            }
        }
    }
}

impl ProtocolEngine {
    /// Checks of a transfer request against its agreement.
    async fn resolve_agreement(
        &self,
        msg: &TransferRequestMessage,
        caller: &PartnerIdentity,
    ) -> Result<DatasetId, ProtocolError> {
        let contract_id = parse_pid(&msg.agreement_id).ok_or_else(|| {
            ProtocolError::MalformedMessage(format!("invalid agreement id {}", msg.agreement_id))
        })?;
        let negotiation = self
            .negotiations
            .find_by_contract_id(contract_id)
            .await?
            .ok_or_else(|| ProtocolError::Rejected(format!("unknown agreement {}", msg.agreement_id)))?;
        if negotiation.partner_id != caller.partner_id {
            return Err(ProtocolError::IdentityMismatch(format!(
                "agreement {} belongs to another partner",
                msg.agreement_id
            )));
        }
        if negotiation.state != NegotiationState::Finalized {
            return Err(ProtocolError::Rejected(format!(
                "agreement {} is not finalized",
                msg.agreement_id
            )));
        }
        if msg.format.parse::<TransferFormat>().is_err() {
            return Err(ProtocolError::Rejected(format!("unsupported format {}", msg.format)));
        }
        self.assets
            .resolve_dataset(&negotiation.target_asset_id)
            .await
            .ok_or_else(|| {
                ProtocolError::Rejected(format!("unknown dataset for asset {}", negotiation.target_asset_id))
            })
    }

    /// `POST /transfers/request`
    pub async fn handle_transfer_request(
        &self,
        version: ProtocolVersion,
        body: &[u8],
        caller: &PartnerIdentity,
    ) -> ProtocolResponse {
        match self.transfer_request(version, body, caller).await {
            Ok(response) => response,
            Err(failure) => self.transfer_failure(version, failure),
        }
    }

    async fn transfer_request(
        &self,
        version: ProtocolVersion,
        body: &[u8],
        caller: &PartnerIdentity,
    ) -> Result<ProtocolResponse, Failure> {
        let msg: TransferRequestMessage = codec::decode(version, body).ok_or_else(|| {
            ProtocolError::MalformedMessage("invalid TransferRequestMessage".into())
        })?;
        if msg.consumer_pid.trim().is_empty() {
            return Err(ProtocolError::MalformedMessage("empty consumerPid".into()).into());
        }

        let mut record = TransferRecord::new(
            msg.consumer_pid.as_str(),
            caller.partner_id.as_str(),
            msg.callback_address.as_str(),
            msg.agreement_id.as_str(),
            msg.format.as_str(),
        )
        .with_credentials(caller.credentials.clone());

        let dataset_id = match self.resolve_agreement(&msg, caller).await {
            Ok(dataset_id) => dataset_id,
            Err(error) => {
                // Failed requests are still recorded, directly as TERMINATED
                record.state = TransferState::Terminated;
                let record = self
                    .transfers
                    .create_transfer(record)
                    .await
                    .map_err(ProtocolError::from)?;
                let (p, c) = pids(&record);
                return Err(Failure::from(error).with_pids(p, c));
            }
        };

        let record = self
            .transfers
            .create_transfer(record)
            .await
            .map_err(ProtocolError::from)?;
        let record = self
            .transfers
            .attach_dataset(record.own_pid, dataset_id)
            .await
            .map_err(ProtocolError::from)?;

        self.dispatcher
            .enqueue(DispatchTask::new(DispatchKind::Started, record.own_pid, version))
            .await;
        info!(
            own_pid = %record.own_pid,
            partner_id = %record.partner_id,
            contract_id = %record.contract_id,
            format = %record.format,
            version = %version,
            "Transfer request accepted"
        );
        Ok(ack(version, StatusCode::CREATED, &record))
    }

    /// Shared path of start (resume), completion, suspension and termination.
    ///
    /// Identity mismatches terminate the transfer; transitions outside the
    /// table are rejected and leave it untouched.
    async fn consumer_transition(
        &self,
        version: ProtocolVersion,
        body: &[u8],
        caller: &PartnerIdentity,
        provider_pid: &str,
        message: ConsumerMessage,
    ) -> Result<ProtocolResponse, Failure> {
        let own_pid = parse_pid(provider_pid).ok_or_else(|| {
            ProtocolError::MalformedMessage(format!("invalid process id {}", provider_pid))
        })?;
        let record = self
            .transfers
            .find_by_id(own_pid)
            .await
            .map_err(ProtocolError::from)?
            .ok_or_else(|| ProtocolError::UnknownRecord(provider_pid.to_string()))?;
        let (p, c) = pids(&record);

        if record.partner_id != caller.partner_id {
            self.transfers.force_terminate(own_pid).await;
            return Err(Failure::from(ProtocolError::IdentityMismatch(format!(
                "transfer {} does not belong to {}",
                provider_pid, caller.partner_id
            )))
            .with_pids(p, c));
        }

        let (msg_provider_pid, msg_consumer_pid) =
            message.decode_pids(version, body).ok_or_else(|| {
                Failure::from(ProtocolError::MalformedMessage(format!("invalid {}", message.name())))
                    .with_pids(p.clone(), c.clone())
            })?;
        if !same_pid(&msg_provider_pid, provider_pid) || msg_consumer_pid != record.consumer_pid {
            self.transfers.force_terminate(own_pid).await;
            return Err(Failure::from(ProtocolError::IdentityMismatch(format!(
                "message ids ({}, {}) do not match the transfer",
                msg_provider_pid, msg_consumer_pid
            )))
            .with_pids(p, c));
        }

        // A consumer start only resumes; the first start is ours to send
        if matches!(message, ConsumerMessage::Start) && record.state != TransferState::Suspended {
            return Err(Failure::from(ProtocolError::InvalidTransition(format!(
                "{} -> {} (only suspended transfers can be resumed)",
                record.state,
                TransferState::Started
            )))
            .with_pids(p, c));
        }

        let updated = self
            .transfers
            .transition(own_pid, message.target())
            .await
            .map_err(|e| Failure::from(ProtocolError::from(e)).with_pids(p, c))?;
        info!(
            own_pid = %own_pid,
            from = %record.state,
            to = %updated.state,
            "Transfer updated by consumer"
        );
        Ok(ack(version, StatusCode::OK, &updated))
    }

    async fn run_consumer_transition(
        &self,
        version: ProtocolVersion,
        body: &[u8],
        caller: &PartnerIdentity,
        provider_pid: &str,
        message: ConsumerMessage,
    ) -> ProtocolResponse {
        match self
            .consumer_transition(version, body, caller, provider_pid, message)
            .await
        {
            Ok(response) => response,
            Err(failure) => self.transfer_failure(version, failure),
        }
    }

    /// `POST /transfers/{providerPid}/start`
    pub async fn handle_transfer_start(
        &self,
        version: ProtocolVersion,
        body: &[u8],
        caller: &PartnerIdentity,
        provider_pid: &str,
    ) -> ProtocolResponse {
        self.run_consumer_transition(version, body, caller, provider_pid, ConsumerMessage::Start)
            .await
    }

    /// `POST /transfers/{providerPid}/completion`
    pub async fn handle_transfer_completion(
        &self,
        version: ProtocolVersion,
        body: &[u8],
        caller: &PartnerIdentity,
        provider_pid: &str,
    ) -> ProtocolResponse {
        self.run_consumer_transition(version, body, caller, provider_pid, ConsumerMessage::Completion)
            .await
    }

    /// `POST /transfers/{providerPid}/suspension`
    pub async fn handle_transfer_suspension(
        &self,
        version: ProtocolVersion,
        body: &[u8],
        caller: &PartnerIdentity,
        provider_pid: &str,
    ) -> ProtocolResponse {
        self.run_consumer_transition(version, body, caller, provider_pid, ConsumerMessage::Suspension)
            .await
    }

    /// `POST /transfers/{providerPid}/termination`
    pub async fn handle_transfer_termination(
        &self,
        version: ProtocolVersion,
        body: &[u8],
        caller: &PartnerIdentity,
        provider_pid: &str,
    ) -> ProtocolResponse {
        self.run_consumer_transition(version, body, caller, provider_pid, ConsumerMessage::Termination)
            .await
    }

    /// `GET /transfers/{providerPid}`
    pub async fn handle_transfer_status(
        &self,
        version: ProtocolVersion,
        caller: &PartnerIdentity,
        provider_pid: &str,
    ) -> ProtocolResponse {
        let lookup = match parse_pid(provider_pid) {
            Some(own_pid) => self
                .transfers
                .find_by_id(own_pid)
                .await
                .map_err(ProtocolError::from),
            None => Err(ProtocolError::MalformedMessage(format!(
                "invalid process id {}",
                provider_pid
            ))),
        };
        match lookup {
            Ok(Some(record)) if record.partner_id == caller.partner_id => {
                ack(version, StatusCode::OK, &record)
            }
            Ok(_) => self.transfer_failure(
                version,
                Failure::from(ProtocolError::NotFound(provider_pid.to_string())),
            ),
            Err(error) => self.transfer_failure(version, error.into()),
        }
    }

    /// `POST /transfers/token/refresh`
    ///
    /// Exchanges a refresh token for a fresh access/refresh pair carrying
    /// the same grant.
    pub async fn handle_token_refresh(
        &self,
        version: ProtocolVersion,
        body: &[u8],
        caller: &PartnerIdentity,
    ) -> ProtocolResponse {
        match self.token_refresh(body, caller) {
            Ok(response) => response,
            Err(failure) => self.transfer_failure(version, failure),
        }
    }

    fn token_refresh(&self, body: &[u8], caller: &PartnerIdentity) -> Result<ProtocolResponse, Failure> {
        let request: RefreshTokenRequest = serde_json::from_slice(body)
            .map_err(|e| ProtocolError::MalformedMessage(format!("invalid refresh request: {}", e)))?;

        let grant = self
            .access
            .validate_refresh(&request.refresh_token, &caller.partner_id)
            .ok_or_else(|| ProtocolError::Unauthorized("invalid refresh token".into()))?;
        let contract_id = grant.contract_id.clone().unwrap_or_default();

        let access_token = match (self.tokens.kind_of(&grant), &grant.data_address, &grant.asset_id) {
            (Some(TokenKind::DataAccess), Some(address), _) => {
                self.tokens.issue_data_access_token(&contract_id, address)
            }
            (Some(TokenKind::WriteAccess), _, Some(asset_id)) => {
                self.tokens.issue_write_access_token(&contract_id, asset_id)
            }
            _ => return Err(ProtocolError::Unauthorized("refresh token grants nothing".into()).into()),
        }
        .map_err(|e| ProtocolError::Unexpected(e.to_string()))?;
        let refresh_token = self
            .tokens
            .issue_refresh_token(&access_token, &caller.partner_id)
            .map_err(|e| ProtocolError::Unexpected(e.to_string()))?;

        info!(partner_id = %caller.partner_id, contract_id = %contract_id, "Access token refreshed");
        let response = RefreshTokenResponse {
            access_token,
            refresh_token,
            expires_in: self.tokens.config().access_validity_secs,
            token_type: "Bearer".to_string(),
        };
        let body = serde_json::to_vec(&response).map_err(|e| ProtocolError::Unexpected(e.to_string()))?;
        Ok(ProtocolResponse::new(StatusCode::OK, Some(body)))
    }
}
