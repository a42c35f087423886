//! Dispatch execution
//!
//! [`execute`] is a plain async function of (context, task) so the worker
//! pool and the tests drive it the same way.

use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use super::client::PartnerClient;
use super::{DispatchKind, DispatchTask};
use crate::adapters::{AssetResolver, PartnerTokenProvider};
use crate::codec::{
    self, ContractAgreementMessage, ContractNegotiationEventMessage, DataAddress,
    EndpointProperty, NegotiationEventType, ProtocolVersion, TransferStartMessage, WireMessage,
};
use crate::config::ProviderConfig;
use crate::core_types::{format_pid, parse_pid};
use crate::error::DispatchError;
use crate::negotiation::{NegotiationMachine, NegotiationRecord, NegotiationState};
use crate::token::TokenService;
use crate::transfer::{TransferFormat, TransferMachine, TransferRecord, TransferState};

pub const HTTP_ENDPOINT_TYPE: &str = "https://w3id.org/idsa/v4.1/HTTP";

/// Everything a dispatch task needs.
pub struct DispatchContext {
    pub negotiations: Arc<NegotiationMachine>,
    pub transfers: Arc<TransferMachine>,
    pub tokens: Arc<TokenService>,
    pub assets: Arc<dyn AssetResolver>,
    pub partner_tokens: Arc<dyn PartnerTokenProvider>,
    pub client: Arc<dyn PartnerClient>,
    pub provider: ProviderConfig,
}

impl DispatchContext {
    /// Refresh endpoint advertised in data addresses for `version`.
    pub fn refresh_endpoint(&self, version: ProtocolVersion) -> String {
        format!(
            "{}{}/transfers/token/refresh",
            self.provider.dsp_url.trim_end_matches('/'),
            version.path_prefix()
        )
    }

    async fn send<T: WireMessage>(
        &self,
        partner_id: &str,
        url: String,
        version: ProtocolVersion,
        message: &T,
    ) -> Result<(), DispatchError> {
        let bearer = self
            .partner_tokens
            .provide_token_for_partner(partner_id)
            .await
            .ok_or_else(|| DispatchError::Credential(partner_id.to_string()))?;
        self.client
            .post(&url, &bearer, codec::encode(version, message))
            .await
    }
}

fn callback_url(partner_dsp_url: &str, suffix: &str) -> String {
    format!("{}{}", partner_dsp_url.trim_end_matches('/'), suffix)
}

/// Run one task to completion.
pub async fn execute(ctx: &DispatchContext, task: DispatchTask) -> Result<(), DispatchError> {
    match task.kind {
        DispatchKind::Agreed => send_agreement(ctx, task).await,
        DispatchKind::Finalized => send_finalized(ctx, task).await,
        DispatchKind::Started => send_start(ctx, task).await,
    }
}

async fn load_negotiation(
    ctx: &DispatchContext,
    task: DispatchTask,
    expected: NegotiationState,
) -> Result<NegotiationRecord, DispatchError> {
    let record = ctx.negotiations.find_by_id(task.record_id).await?;
    match record {
        Some(record) if record.state == expected => Ok(record),
        Some(record) => {
            warn!(
                own_pid = %task.record_id,
                kind = %task.kind,
                state = %record.state,
                "Negotiation moved on before dispatch, terminating"
            );
            ctx.negotiations.force_terminate(task.record_id).await;
            Err(DispatchError::Precondition(format!(
                "negotiation {} is {}, expected {}",
                task.record_id, record.state, expected
            )))
        }
        None => Err(DispatchError::Precondition(format!(
            "negotiation {} not found",
            task.record_id
        ))),
    }
}

/// Agreement policy: the requested offer's rules under the new contract id.
fn build_agreement(record: &NegotiationRecord, provider_id: &str) -> Value {
    let mut agreement = json!({
        "@type": "Agreement",
        "target": record.target_asset_id,
        "assigner": provider_id,
        "assignee": record.partner_id,
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    });
    if let Some(contract_id) = record.contract_id {
        agreement["@id"] = Value::String(format_pid(contract_id));
    }
    if let Some(offer) = &record.offer {
        for rule in ["permission", "prohibition", "obligation"] {
            if let Some(v) = offer.get(rule) {
                agreement[rule] = v.clone();
            }
        }
    }
    agreement
}

async fn send_agreement(ctx: &DispatchContext, task: DispatchTask) -> Result<(), DispatchError> {
    load_negotiation(ctx, task, NegotiationState::Requested).await?;

    // The contract id is minted by the transition and must be on the wire
    let record = ctx
        .negotiations
        .transition(task.record_id, NegotiationState::Agreed)
        .await?;

    let message = ContractAgreementMessage {
        provider_pid: format_pid(record.own_pid),
        consumer_pid: record.consumer_pid.clone(),
        agreement: build_agreement(&record, &ctx.provider.participant_id),
        callback_address: Some(ctx.provider.dsp_url.clone()),
    };
    let url = callback_url(
        &record.partner_dsp_url,
        &format!("/negotiations/{}/agreement", record.consumer_pid),
    );
    ctx.send(&record.partner_id, url, task.version, &message).await?;

    info!(own_pid = %record.own_pid, contract_id = ?record.contract_id, "Agreement delivered");
    Ok(())
}

async fn send_finalized(ctx: &DispatchContext, task: DispatchTask) -> Result<(), DispatchError> {
    let record = load_negotiation(ctx, task, NegotiationState::Verified).await?;

    let message = ContractNegotiationEventMessage {
        provider_pid: format_pid(record.own_pid),
        consumer_pid: record.consumer_pid.clone(),
        event_type: NegotiationEventType::Finalized,
    };
    let url = callback_url(
        &record.partner_dsp_url,
        &format!("/negotiations/{}/events", record.consumer_pid),
    );
    ctx.send(&record.partner_id, url, task.version, &message).await?;

    ctx.negotiations
        .transition(task.record_id, NegotiationState::Finalized)
        .await?;
    info!(own_pid = %record.own_pid, "Negotiation finalized");
    Ok(())
}

async fn load_transfer(ctx: &DispatchContext, task: DispatchTask) -> Result<TransferRecord, DispatchError> {
    let record = ctx.transfers.find_by_id(task.record_id).await?;
    match record {
        Some(record) if record.state == TransferState::Requested => Ok(record),
        Some(record) => {
            warn!(
                own_pid = %task.record_id,
                state = %record.state,
                "Transfer moved on before dispatch, terminating"
            );
            ctx.transfers.force_terminate(task.record_id).await;
            Err(DispatchError::Precondition(format!(
                "transfer {} is {}, expected {}",
                task.record_id,
                record.state,
                TransferState::Requested
            )))
        }
        None => Err(DispatchError::Precondition(format!(
            "transfer {} not found",
            task.record_id
        ))),
    }
}

/// Precondition failures past the state check also void the transfer.
async fn abort_transfer(ctx: &DispatchContext, record: &TransferRecord, reason: String) -> DispatchError {
    warn!(own_pid = %record.own_pid, reason = %reason, "Cannot start transfer, terminating");
    ctx.transfers.force_terminate(record.own_pid).await;
    DispatchError::Precondition(reason)
}

/// Access token for the transfer's format.
async fn issue_access_token(
    ctx: &DispatchContext,
    record: &TransferRecord,
    address: &str,
) -> Result<String, DispatchError> {
    let format = match record.transfer_format() {
        Some(format) => format,
        None => {
            return Err(abort_transfer(ctx, record, format!("unsupported format {}", record.format)).await);
        }
    };
    let issued = match format {
        TransferFormat::HttpPull => ctx.tokens.issue_data_access_token(&record.contract_id, address),
        TransferFormat::HttpWrite => {
            let negotiation = match parse_pid(&record.contract_id) {
                Some(contract_id) => ctx.negotiations.find_by_contract_id(contract_id).await?,
                None => None,
            };
            let Some(negotiation) = negotiation else {
                return Err(abort_transfer(ctx, record, format!("agreement {} vanished", record.contract_id)).await);
            };
            ctx.tokens
                .issue_write_access_token(&record.contract_id, &negotiation.target_asset_id)
        }
    };
    issued.map_err(|e| DispatchError::Precondition(e.to_string()))
}

async fn send_start(ctx: &DispatchContext, task: DispatchTask) -> Result<(), DispatchError> {
    let record = load_transfer(ctx, task).await?;

    let address = match record.dataset_id {
        Some(dataset_id) => ctx.assets.dataset_address(dataset_id).await,
        None => None,
    };
    let Some(address) = address else {
        return Err(abort_transfer(ctx, &record, "no dataset address".to_string()).await);
    };

    let access_token = issue_access_token(ctx, &record, &address).await?;
    let refresh_token = ctx
        .tokens
        .issue_refresh_token(&access_token, &record.partner_id)
        .map_err(|e| DispatchError::Precondition(e.to_string()))?;

    let property = |name: &str, value: String| EndpointProperty {
        name: name.to_string(),
        value,
    };
    let message = TransferStartMessage {
        provider_pid: format_pid(record.own_pid),
        consumer_pid: record.consumer_pid.clone(),
        data_address: Some(DataAddress {
            endpoint_type: HTTP_ENDPOINT_TYPE.to_string(),
            endpoint: Some(address.clone()),
            properties: vec![
                property("authorization", access_token),
                property("authType", "bearer".to_string()),
                property("refreshToken", refresh_token),
                property("expiresIn", ctx.tokens.config().access_validity_secs.to_string()),
                property("refreshEndpoint", ctx.refresh_endpoint(task.version)),
            ],
        }),
    };
    let url = callback_url(
        &record.partner_dsp_url,
        &format!("/transfers/{}/start", record.consumer_pid),
    );
    ctx.send(&record.partner_id, url, task.version, &message).await?;

    ctx.transfers.start(record.own_pid, &address).await?;
    info!(own_pid = %record.own_pid, address = %address, "Transfer started");
    Ok(())
}
