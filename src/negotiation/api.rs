//! Negotiation protocol handlers

use axum::http::StatusCode;
use tracing::info;

use super::state::NegotiationState;
use super::types::NegotiationRecord;
use crate::adapters::PartnerIdentity;
use crate::codec::{
    self, ContractAgreementVerificationMessage, ContractNegotiation,
    ContractNegotiationTerminationMessage, ContractRequestMessage, ProtocolVersion,
};
use crate::core_types::{format_pid, parse_pid, same_pid};
use crate::dispatch::{DispatchKind, DispatchTask};
use crate::engine::{Failure, ProtocolEngine, ProtocolResponse};
use crate::error::ProtocolError;

fn ack(version: ProtocolVersion, status: StatusCode, record: &NegotiationRecord) -> ProtocolResponse {
    ProtocolResponse::message(
        status,
        version,
        &ContractNegotiation {
            provider_pid: format_pid(record.own_pid),
            consumer_pid: record.consumer_pid.clone(),
            state: record.state,
        },
    )
}

fn pids(record: &NegotiationRecord) -> (Option<String>, Option<String>) {
    (Some(format_pid(record.own_pid)), Some(record.consumer_pid.clone()))
}

impl ProtocolEngine {
    /// Load the negotiation named in the path and check the caller owns it.
    ///
    /// On an identity mismatch the negotiation is terminated.
    async fn negotiation_for(
        &self,
        provider_pid: &str,
        caller: &PartnerIdentity,
    ) -> Result<NegotiationRecord, Failure> {
        let own_pid = parse_pid(provider_pid).ok_or_else(|| {
            ProtocolError::MalformedMessage(format!("invalid process id {}", provider_pid))
        })?;
        let record = self
            .negotiations
            .find_by_id(own_pid)
            .await
            .map_err(ProtocolError::from)?
            .ok_or_else(|| ProtocolError::UnknownRecord(provider_pid.to_string()))?;

        if record.partner_id != caller.partner_id {
            self.negotiations.force_terminate(own_pid).await;
            let (p, c) = pids(&record);
            return Err(Failure::from(ProtocolError::IdentityMismatch(format!(
                "negotiation {} does not belong to {}",
                provider_pid, caller.partner_id
            )))
            .with_pids(p, c));
        }
        Ok(record)
    }

    /// Reject a body whose ids do not name `record`; terminates the record.
    async fn check_message_pids(
        &self,
        record: &NegotiationRecord,
        provider_pid: &str,
        consumer_pid: &str,
    ) -> Result<(), Failure> {
        if same_pid(provider_pid, &format_pid(record.own_pid)) && consumer_pid == record.consumer_pid {
            return Ok(());
        }
        self.negotiations.force_terminate(record.own_pid).await;
        let (p, c) = pids(record);
        Err(Failure::from(ProtocolError::IdentityMismatch(format!(
            "message ids ({}, {}) do not match the negotiation",
            provider_pid, consumer_pid
        )))
        .with_pids(p, c))
    }

    /// `POST /negotiations/request`
    pub async fn handle_contract_request(
        &self,
        version: ProtocolVersion,
        body: &[u8],
        caller: &PartnerIdentity,
    ) -> ProtocolResponse {
        match self.contract_request(version, body, caller).await {
            Ok(response) => response,
            Err(failure) => self.negotiation_failure(version, failure),
        }
    }

    async fn contract_request(
        &self,
        version: ProtocolVersion,
        body: &[u8],
        caller: &PartnerIdentity,
    ) -> Result<ProtocolResponse, Failure> {
        let msg: ContractRequestMessage = codec::decode(version, body).ok_or_else(|| {
            ProtocolError::MalformedMessage("invalid ContractRequestMessage".into())
        })?;

        if msg.provider_pid.is_some() {
            return Err(Failure::from(ProtocolError::Rejected(
                "counter requests are not supported".into(),
            ))
            .with_pids(msg.provider_pid.clone(), Some(msg.consumer_pid.clone())));
        }
        if msg.consumer_pid.trim().is_empty() {
            return Err(ProtocolError::MalformedMessage("empty consumerPid".into()).into());
        }

        let target = msg.target().unwrap_or_default().to_string();
        let record = NegotiationRecord::new(
            msg.consumer_pid.as_str(),
            caller.partner_id.as_str(),
            msg.callback_address.as_str(),
            target.as_str(),
        )
        .with_credentials(caller.credentials.clone())
        .with_offer(msg.offer.clone());
        let record = self
            .negotiations
            .create(record)
            .await
            .map_err(ProtocolError::from)?;
        let (p, c) = pids(&record);

        let verdict = if target.is_empty() {
            Err(ProtocolError::MalformedMessage("offer has no target".into()))
        } else {
            self.offers
                .validate_offer(&msg.offer, &target, &caller.partner_id)
                .await
                .map_err(ProtocolError::Rejected)
        };
        if let Err(error) = verdict {
            self.negotiations.force_terminate(record.own_pid).await;
            return Err(Failure::from(error).with_pids(p, c));
        }

        self.dispatcher
            .enqueue(DispatchTask::new(DispatchKind::Agreed, record.own_pid, version))
            .await;
        info!(
            own_pid = %record.own_pid,
            partner_id = %record.partner_id,
            target = %record.target_asset_id,
            version = %version,
            "Contract request accepted"
        );
        Ok(ack(version, StatusCode::CREATED, &record))
    }

    /// `POST /negotiations/{providerPid}/agreement/verification`
    pub async fn handle_contract_verification(
        &self,
        version: ProtocolVersion,
        body: &[u8],
        caller: &PartnerIdentity,
        provider_pid: &str,
    ) -> ProtocolResponse {
        match self.contract_verification(version, body, caller, provider_pid).await {
            Ok(response) => response,
            Err(failure) => self.negotiation_failure(version, failure),
        }
    }

    async fn contract_verification(
        &self,
        version: ProtocolVersion,
        body: &[u8],
        caller: &PartnerIdentity,
        provider_pid: &str,
    ) -> Result<ProtocolResponse, Failure> {
        let record = self.negotiation_for(provider_pid, caller).await?;
        let (p, c) = pids(&record);

        let msg: ContractAgreementVerificationMessage = codec::decode(version, body)
            .ok_or_else(|| {
                Failure::from(ProtocolError::MalformedMessage(
                    "invalid ContractAgreementVerificationMessage".into(),
                ))
                .with_pids(p.clone(), c.clone())
            })?;
        self.check_message_pids(&record, &msg.provider_pid, &msg.consumer_pid)
            .await?;

        let verified = match self
            .negotiations
            .transition(record.own_pid, NegotiationState::Verified)
            .await
        {
            Ok(verified) => verified,
            Err(e) => {
                self.negotiations.force_terminate(record.own_pid).await;
                return Err(Failure::from(ProtocolError::from(e)).with_pids(p, c));
            }
        };

        self.dispatcher
            .enqueue(DispatchTask::new(DispatchKind::Finalized, verified.own_pid, version))
            .await;
        Ok(ack(version, StatusCode::OK, &verified))
    }

    /// `POST /negotiations/{providerPid}/termination`
    pub async fn handle_negotiation_termination(
        &self,
        version: ProtocolVersion,
        body: &[u8],
        caller: &PartnerIdentity,
        provider_pid: &str,
    ) -> ProtocolResponse {
        match self.negotiation_termination(version, body, caller, provider_pid).await {
            Ok(response) => response,
            Err(failure) => self.negotiation_failure(version, failure),
        }
    }

    async fn negotiation_termination(
        &self,
        version: ProtocolVersion,
        body: &[u8],
        caller: &PartnerIdentity,
        provider_pid: &str,
    ) -> Result<ProtocolResponse, Failure> {
        let record = self.negotiation_for(provider_pid, caller).await?;
        let (p, c) = pids(&record);

        let ContractNegotiationTerminationMessage(msg) = codec::decode(version, body)
            .ok_or_else(|| {
                Failure::from(ProtocolError::MalformedMessage(
                    "invalid ContractNegotiationTerminationMessage".into(),
                ))
                .with_pids(p.clone(), c.clone())
            })?;
        self.check_message_pids(&record, &msg.provider_pid, &msg.consumer_pid)
            .await?;

        // FINALIZED and TERMINATED both refuse the transition
        let terminated = self
            .negotiations
            .transition(record.own_pid, NegotiationState::Terminated)
            .await
            .map_err(|e| Failure::from(ProtocolError::from(e)).with_pids(p, c))?;

        info!(
            own_pid = %terminated.own_pid,
            code = ?msg.code,
            reason = ?msg.reason,
            "Negotiation terminated by consumer"
        );
        Ok(ack(version, StatusCode::OK, &terminated))
    }

    /// `GET /negotiations/{providerPid}`
    ///
    /// Negotiations of other partners are reported as not found.
    pub async fn handle_negotiation_status(
        &self,
        version: ProtocolVersion,
        caller: &PartnerIdentity,
        provider_pid: &str,
    ) -> ProtocolResponse {
        let lookup = match parse_pid(provider_pid) {
            Some(own_pid) => self
                .negotiations
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
            Ok(_) => self.negotiation_failure(
                version,
                Failure::from(ProtocolError::NotFound(provider_pid.to_string())),
            ),
            Err(error) => self.negotiation_failure(version, error.into()),
        }
    }
}
