//! Integration Tests for the protocol engine
//!
//! Full negotiation and transfer flows against the in-memory store. Callbacks
//! are run by draining the dispatch queue by hand, so every test decides
//! when the "async" side happens. The partner is a `MockPartnerClient`.

use axum::http::StatusCode;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::PartnerIdentity;
use crate::codec::{
    self, ContractAgreementMessage, ContractAgreementVerificationMessage, ContractNegotiation,
    ContractNegotiationError, ContractNegotiationEventMessage, ContractNegotiationTerminationMessage,
    ContractRequestMessage, NegotiationEventType, ProcessInterruption, ProtocolVersion,
    TransferCompletionMessage, TransferError, TransferProcess, TransferRequestMessage,
    TransferStartMessage, TransferSuspensionMessage, TransferTerminationMessage, WireMessage,
};
use crate::config::AppConfig;
use crate::core_types::{format_pid, parse_pid};
use crate::dispatch::client::MockPartnerClient;
use crate::dispatch::{DispatchContext, DispatchKind, DispatchReceiver, DispatchTask, execute};
use crate::engine::{Collaborators, ProtocolEngine, ProtocolResponse};
use crate::error::DispatchError;
use crate::negotiation::{NegotiationRecord, NegotiationState};
use crate::transfer::api::RefreshTokenResponse;
use crate::transfer::{TransferRecord, TransferState};

const CONFIG: &str = r#"
log_level: debug
log_dir: ./logs
log_file: test.log
use_json: false
rotation: never
gateway:
  host: 127.0.0.1
  port: 0
provider:
  participant_id: "urn:provider:test"
  dsp_url: "https://provider.example/dsp"
  data_plane_url: "https://data.provider.example"
partners:
  - partner_id: "urn:consumer:a"
    inbound_token: "token-a"
    outbound_token: "callback-a"
    credentials: "membership:a"
  - partner_id: "urn:consumer:b"
    inbound_token: "token-b"
    outbound_token: "callback-b"
assets:
  - asset_id: "urn:asset:1"
    dataset_id: "7f3c1f52-6b7c-4c38-9a55-2f54c5c0f001"
    offer:
      "@type": Offer
      target: "urn:asset:1"
      permission:
        - action: use
"#;

const DATASET_ADDRESS: &str = "https://data.provider.example/datasets/7f3c1f52-6b7c-4c38-9a55-2f54c5c0f001";
const CONSUMER_DSP: &str = "https://consumer-a.example/dsp";
const NEG_CPID: &str = "urn:uuid:0b7f1e3a-9d2c-4e6b-8f5a-3c1d2e4f5a66";
const TP_CPID: &str = "urn:uuid:5e2d8c4b-1a3f-4b6e-9d7c-2f8a1b3c4d55";

fn offer() -> Value {
    json!({
        "@id": "urn:uuid:offer-1",
        "@type": "Offer",
        "target": "urn:asset:1",
        "permission": [{"action": "use"}]
    })
}

fn decode_body<T: WireMessage>(version: ProtocolVersion, response: &ProtocolResponse) -> T {
    let body = response.body.as_deref().expect("response has a body");
    codec::decode(version, body)
        .unwrap_or_else(|| panic!("undecodable body: {}", String::from_utf8_lossy(body)))
}

fn interruption(provider_pid: &str, consumer_pid: &str) -> ProcessInterruption {
    ProcessInterruption {
        provider_pid: provider_pid.to_string(),
        consumer_pid: consumer_pid.to_string(),
        code: None,
        reason: vec!["test".into()],
    }
}

struct TestHarness {
    version: ProtocolVersion,
    engine: Arc<ProtocolEngine>,
    ctx: Arc<DispatchContext>,
    receiver: DispatchReceiver,
    client: Arc<MockPartnerClient>,
    partner_a: PartnerIdentity,
    partner_b: PartnerIdentity,
}

impl TestHarness {
    async fn new(version: ProtocolVersion) -> Self {
        let config = AppConfig::from_yaml(CONFIG).unwrap();
        let client = Arc::new(MockPartnerClient::new());
        let (engine, ctx, receiver) =
            ProtocolEngine::build(&config, Collaborators::from_config(&config), client.clone());
        let partner_a = engine.identify(Some("Bearer token-a")).await.unwrap();
        let partner_b = engine.identify(Some("Bearer token-b")).await.unwrap();
        Self {
            version,
            engine,
            ctx,
            receiver,
            client,
            partner_a,
            partner_b,
        }
    }

    /// Run every queued callback in order.
    async fn drain(&mut self) -> Vec<(DispatchTask, Result<(), DispatchError>)> {
        let mut done = Vec::new();
        while let Some(task) = self.receiver.try_recv() {
            let outcome = execute(&self.ctx, task).await;
            done.push((task, outcome));
        }
        done
    }

    async fn drain_ok(&mut self, kind: DispatchKind) {
        let done = self.drain().await;
        assert_eq!(done.len(), 1, "expected exactly one {} task", kind);
        assert_eq!(done[0].0.kind, kind);
        assert_eq!(done[0].1, Ok(()));
    }

    async fn negotiation(&self, provider_pid: &str) -> NegotiationRecord {
        self.engine
            .negotiations
            .find_by_id(parse_pid(provider_pid).unwrap())
            .await
            .unwrap()
            .unwrap()
    }

    async fn transfer(&self, provider_pid: &str) -> TransferRecord {
        self.engine
            .transfers
            .find_by_id(parse_pid(provider_pid).unwrap())
            .await
            .unwrap()
            .unwrap()
    }

    async fn request_contract(&self, caller: &PartnerIdentity, offer: Value) -> ProtocolResponse {
        let msg = ContractRequestMessage {
            provider_pid: None,
            consumer_pid: NEG_CPID.into(),
            offer,
            callback_address: CONSUMER_DSP.into(),
        };
        self.engine
            .handle_contract_request(self.version, &codec::encode(self.version, &msg), caller)
            .await
    }

    async fn verify(&self, caller: &PartnerIdentity, path_pid: &str, body_pid: &str) -> ProtocolResponse {
        let msg = ContractAgreementVerificationMessage {
            provider_pid: body_pid.into(),
            consumer_pid: NEG_CPID.into(),
        };
        self.engine
            .handle_contract_verification(self.version, &codec::encode(self.version, &msg), caller, path_pid)
            .await
    }

    /// Negotiation in AGREED; returns its provider pid.
    async fn agreed(&mut self) -> String {
        let response = self.request_contract(&self.partner_a.clone(), offer()).await;
        assert_eq!(response.status, StatusCode::CREATED);
        let ack: ContractNegotiation = decode_body(self.version, &response);
        assert_eq!(ack.state, NegotiationState::Requested);
        assert_eq!(ack.consumer_pid, NEG_CPID);
        self.drain_ok(DispatchKind::Agreed).await;
        ack.provider_pid
    }

    /// Negotiation in FINALIZED; returns (provider pid, agreement id).
    async fn finalized(&mut self) -> (String, String) {
        let pid = self.agreed().await;
        let response = self.verify(&self.partner_a.clone(), &pid, &pid).await;
        assert_eq!(response.status, StatusCode::OK);
        self.drain_ok(DispatchKind::Finalized).await;

        let record = self.negotiation(&pid).await;
        assert_eq!(record.state, NegotiationState::Finalized);
        (pid, format_pid(record.contract_id.unwrap()))
    }

    async fn request_transfer(&self, caller: &PartnerIdentity, agreement_id: &str, format: &str) -> ProtocolResponse {
        let msg = TransferRequestMessage {
            consumer_pid: TP_CPID.into(),
            agreement_id: agreement_id.into(),
            format: format.into(),
            callback_address: CONSUMER_DSP.into(),
            data_address: None,
        };
        self.engine
            .handle_transfer_request(self.version, &codec::encode(self.version, &msg), caller)
            .await
    }

    /// Transfer in STARTED; returns its provider pid.
    async fn started(&mut self, format: &str) -> String {
        let (_, agreement_id) = self.finalized().await;
        let response = self.request_transfer(&self.partner_a.clone(), &agreement_id, format).await;
        assert_eq!(response.status, StatusCode::CREATED);
        let ack: TransferProcess = decode_body(self.version, &response);
        assert_eq!(ack.state, TransferState::Requested);
        self.drain_ok(DispatchKind::Started).await;
        ack.provider_pid
    }

    /// Start message most recently pushed to the partner.
    fn last_start(&self) -> TransferStartMessage {
        let post = self.client.posts().pop().unwrap();
        assert!(post.url.ends_with(&format!("/transfers/{}/start", TP_CPID)));
        codec::decode_value(self.version, post.body).unwrap()
    }
}

// ============================================================================
// Negotiation
// ============================================================================

#[tokio::test]
async fn test_offer_mismatch_terminates_negotiation() {
    for version in ProtocolVersion::ALL {
        let mut h = TestHarness::new(version).await;
        let mut bad = offer();
        bad["permission"] = json!([{"action": "distribute"}]);

        let response = h.request_contract(&h.partner_a.clone(), bad).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{}", version);

        let ContractNegotiationError(error) = decode_body(version, &response);
        assert_eq!(error.code.as_deref(), Some("REJECTED"));
        assert_eq!(error.consumer_pid.as_deref(), Some(NEG_CPID));
        let record = h.negotiation(&error.provider_pid.unwrap()).await;
        assert_eq!(record.state, NegotiationState::Terminated);
        assert!(record.contract_id.is_none());

        assert!(h.drain().await.is_empty());
        assert_eq!(h.client.post_count(), 0);
    }
}

#[tokio::test]
async fn test_offer_for_unknown_asset_is_rejected() {
    let h = TestHarness::new(ProtocolVersion::V2024_1).await;
    let mut other = offer();
    other["target"] = json!("urn:asset:unknown");

    let response = h.request_contract(&h.partner_a, other).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let ContractNegotiationError(error) = decode_body(h.version, &response);
    assert!(error.reason[0].contains("unknown asset"));
}

#[tokio::test]
async fn test_counter_request_is_rejected_without_record() {
    let mut h = TestHarness::new(ProtocolVersion::V2024_1).await;
    let msg = ContractRequestMessage {
        provider_pid: Some(format_pid(Uuid::new_v4())),
        consumer_pid: NEG_CPID.into(),
        offer: offer(),
        callback_address: CONSUMER_DSP.into(),
    };
    let response = h
        .engine
        .handle_contract_request(h.version, &codec::encode(h.version, &msg), &h.partner_a)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let ContractNegotiationError(error) = decode_body(h.version, &response);
    assert_eq!(error.provider_pid, msg.provider_pid);
    assert!(h.drain().await.is_empty());
}

#[tokio::test]
async fn test_malformed_request_is_rejected() {
    let h = TestHarness::new(ProtocolVersion::V2024_1).await;
    let response = h
        .engine
        .handle_contract_request(h.version, br#"{"@type": "ContractRequestMessage"}"#, &h.partner_a)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let ContractNegotiationError(error) = decode_body(h.version, &response);
    assert_eq!(error.code.as_deref(), Some("MALFORMED_MESSAGE"));
    assert!(error.provider_pid.is_none());
}

#[tokio::test]
async fn test_agreement_callback() {
    for version in ProtocolVersion::ALL {
        let mut h = TestHarness::new(version).await;
        let pid = h.agreed().await;

        let record = h.negotiation(&pid).await;
        assert_eq!(record.state, NegotiationState::Agreed);
        let contract_id = record.contract_id.unwrap();

        let posts = h.client.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].url, format!("{}/negotiations/{}/agreement", CONSUMER_DSP, NEG_CPID));
        assert_eq!(posts[0].bearer, "callback-a");

        let msg: ContractAgreementMessage = codec::decode_value(version, posts[0].body.clone()).unwrap();
        assert_eq!(msg.provider_pid, pid);
        assert_eq!(msg.agreement_id(), Some(format_pid(contract_id).as_str()));
        assert_eq!(msg.agreement["assigner"], "urn:provider:test");
        assert_eq!(msg.agreement["assignee"], "urn:consumer:a");
        assert_eq!(msg.agreement["target"], "urn:asset:1");
    }
}

#[tokio::test]
async fn test_verification_pid_mismatch_terminates() {
    let mut h = TestHarness::new(ProtocolVersion::V2024_1).await;
    let pid = h.agreed().await;

    let other = format_pid(Uuid::new_v4());
    let response = h.verify(&h.partner_a.clone(), &pid, &other).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let ContractNegotiationError(error) = decode_body(h.version, &response);
    assert_eq!(error.code.as_deref(), Some("IDENTITY_MISMATCH"));

    assert_eq!(h.negotiation(&pid).await.state, NegotiationState::Terminated);
    assert!(h.drain().await.is_empty(), "no FINALIZED callback expected");
    assert_eq!(h.client.post_count(), 1);
}

#[tokio::test]
async fn test_verification_by_other_partner_terminates() {
    let mut h = TestHarness::new(ProtocolVersion::V0_8).await;
    let pid = h.agreed().await;

    let response = h.verify(&h.partner_b.clone(), &pid, &pid).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(h.negotiation(&pid).await.state, NegotiationState::Terminated);
    assert!(h.drain().await.is_empty());
}

#[tokio::test]
async fn test_verification_unknown_negotiation() {
    let h = TestHarness::new(ProtocolVersion::V2024_1).await;
    let pid = format_pid(Uuid::new_v4());
    let response = h.verify(&h.partner_a, &pid, &pid).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let ContractNegotiationError(error) = decode_body(h.version, &response);
    assert_eq!(error.code.as_deref(), Some("UNKNOWN_RECORD"));
}

#[tokio::test]
async fn test_verification_before_agreement_terminates() {
    let mut h = TestHarness::new(ProtocolVersion::V2024_1).await;
    let response = h.request_contract(&h.partner_a.clone(), offer()).await;
    let ack: ContractNegotiation = decode_body(h.version, &response);

    // Agreement not dispatched yet: REQUESTED -> VERIFIED is not allowed
    let response = h.verify(&h.partner_a.clone(), &ack.provider_pid, &ack.provider_pid).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(h.negotiation(&ack.provider_pid).await.state, NegotiationState::Terminated);

    // The queued AGREED task finds a terminated record and gives up
    let done = h.drain().await;
    assert_eq!(done.len(), 1);
    assert!(matches!(done[0].1, Err(DispatchError::Precondition(_))));
    assert_eq!(h.client.post_count(), 0);
}

#[tokio::test]
async fn test_finalized_event_callback() {
    for version in ProtocolVersion::ALL {
        let mut h = TestHarness::new(version).await;
        let (pid, _) = h.finalized().await;

        let post = h.client.posts().pop().unwrap();
        assert_eq!(post.url, format!("{}/negotiations/{}/events", CONSUMER_DSP, NEG_CPID));
        let event: ContractNegotiationEventMessage = codec::decode_value(version, post.body).unwrap();
        assert_eq!(event.provider_pid, pid);
        assert_eq!(event.event_type, NegotiationEventType::Finalized);
    }
}

#[tokio::test]
async fn test_termination_of_finalized_negotiation_is_rejected() {
    let mut h = TestHarness::new(ProtocolVersion::V2024_1).await;
    let (pid, _) = h.finalized().await;

    let msg = ContractNegotiationTerminationMessage(interruption(&pid, NEG_CPID));
    let response = h
        .engine
        .handle_negotiation_termination(h.version, &codec::encode(h.version, &msg), &h.partner_a, &pid)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let ContractNegotiationError(error) = decode_body(h.version, &response);
    assert_eq!(error.code.as_deref(), Some("INVALID_STATE_TRANSITION"));
    assert_eq!(h.negotiation(&pid).await.state, NegotiationState::Finalized);
}

#[tokio::test]
async fn test_termination_of_agreed_negotiation() {
    let mut h = TestHarness::new(ProtocolVersion::V0_8).await;
    let pid = h.agreed().await;

    let msg = ContractNegotiationTerminationMessage(interruption(&pid, NEG_CPID));
    let response = h
        .engine
        .handle_negotiation_termination(h.version, &codec::encode(h.version, &msg), &h.partner_a, &pid)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let ack: ContractNegotiation = decode_body(h.version, &response);
    assert_eq!(ack.state, NegotiationState::Terminated);

    let record = h.negotiation(&pid).await;
    assert_eq!(record.state, NegotiationState::Terminated);
    assert!(record.contract_id.is_none());
}

#[tokio::test]
async fn test_negotiation_status_is_private() {
    let mut h = TestHarness::new(ProtocolVersion::V2025_1).await;
    let pid = h.agreed().await;

    let response = h.engine.handle_negotiation_status(h.version, &h.partner_a, &pid).await;
    assert_eq!(response.status, StatusCode::OK);
    let ack: ContractNegotiation = decode_body(h.version, &response);
    assert_eq!(ack.state, NegotiationState::Agreed);

    let response = h.engine.handle_negotiation_status(h.version, &h.partner_b, &pid).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    // Looking is not touching
    assert_eq!(h.negotiation(&pid).await.state, NegotiationState::Agreed);

    let response = h.engine.handle_negotiation_status(h.version, &h.partner_a, "not-a-pid").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_failed_agreement_callback_keeps_agreed() {
    let mut h = TestHarness::new(ProtocolVersion::V2024_1).await;
    h.client.set_fail_status(Some(503));
    let response = h.request_contract(&h.partner_a.clone(), offer()).await;
    let ack: ContractNegotiation = decode_body(h.version, &response);

    let done = h.drain().await;
    assert_eq!(done[0].1, Err(DispatchError::PartnerStatus(503)));
    // No retry: the POST happened once
    assert_eq!(h.client.post_count(), 1);
    let record = h.negotiation(&ack.provider_pid).await;
    assert_eq!(record.state, NegotiationState::Agreed);
    assert!(record.contract_id.is_some());
}

#[tokio::test]
async fn test_failed_finalized_callback_keeps_verified() {
    let mut h = TestHarness::new(ProtocolVersion::V2024_1).await;
    let pid = h.agreed().await;
    h.client.set_fail_status(Some(500));

    let response = h.verify(&h.partner_a.clone(), &pid, &pid).await;
    assert_eq!(response.status, StatusCode::OK);
    let done = h.drain().await;
    assert_eq!(done[0].1, Err(DispatchError::PartnerStatus(500)));
    assert_eq!(h.negotiation(&pid).await.state, NegotiationState::Verified);
}

// ============================================================================
// Transfer
// ============================================================================

#[tokio::test]
async fn test_transfer_before_finalized_is_rejected() {
    let mut h = TestHarness::new(ProtocolVersion::V2024_1).await;
    let pid = h.agreed().await;
    let agreement_id = format_pid(h.negotiation(&pid).await.contract_id.unwrap());

    let response = h.request_transfer(&h.partner_a.clone(), &agreement_id, "HttpData-PULL").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let TransferError(error) = decode_body(h.version, &response);
    assert!(error.reason[0].contains("not finalized"), "{:?}", error.reason);

    let record = h.transfer(&error.provider_pid.unwrap()).await;
    assert_eq!(record.state, TransferState::Terminated);
    assert!(h.drain().await.is_empty());
}

#[tokio::test]
async fn test_transfer_request_validation() {
    let mut h = TestHarness::new(ProtocolVersion::V0_8).await;
    let (_, agreement_id) = h.finalized().await;

    let cases = [
        (agreement_id.as_str(), "HttpData-PUSH", "unsupported format"),
        ("urn:uuid:7b1d0a4e-3c2f-4d5e-8a9b-0c1d2e3f4a5b", "HttpData-PULL", "unknown agreement"),
    ];
    for (agreement, format, reason) in cases {
        let response = h.request_transfer(&h.partner_a.clone(), agreement, format).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        let TransferError(error) = decode_body(h.version, &response);
        assert!(error.reason[0].contains(reason), "{:?}", error.reason);
        assert_eq!(h.transfer(&error.provider_pid.unwrap()).await.state, TransferState::Terminated);
    }

    // Someone else's agreement
    let response = h.request_transfer(&h.partner_b.clone(), &agreement_id, "HttpData-PULL").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let TransferError(error) = decode_body(h.version, &response);
    assert_eq!(error.code.as_deref(), Some("IDENTITY_MISMATCH"));

    assert!(h.drain().await.is_empty());
}

#[tokio::test]
async fn test_full_happy_path() {
    for version in ProtocolVersion::ALL {
        let mut h = TestHarness::new(version).await;
        let pid = h.started("HttpData-PULL").await;

        let record = h.transfer(&pid).await;
        assert_eq!(record.state, TransferState::Started, "{}", version);
        assert_eq!(record.dataset_address_url.as_deref(), Some(DATASET_ADDRESS));
        assert_eq!(h.client.post_count(), 3);

        let start = h.last_start();
        assert_eq!(start.provider_pid, pid);
        let address = start.data_address.unwrap();
        assert_eq!(address.endpoint.as_deref(), Some(DATASET_ADDRESS));
        assert_eq!(address.property("authType"), Some("bearer"));
        assert_eq!(address.property("expiresIn"), Some("300"));
        assert_eq!(
            address.property("refreshEndpoint"),
            Some(format!("https://provider.example/dsp{}/transfers/token/refresh", version.path_prefix()).as_str())
        );

        let token = address.property("authorization").unwrap();
        let access = h.engine.access_validator();
        assert!(access.validate_access(token, DATASET_ADDRESS).await);
        assert!(!access.validate_access(token, "https://data.provider.example/datasets/other").await);
        assert!(!access.validate_write(token, "urn:asset:1").await);
    }
}

#[tokio::test]
async fn test_write_transfer_issues_write_token() {
    let mut h = TestHarness::new(ProtocolVersion::V2024_1).await;
    h.started("HttpData-WRITE").await;

    let address = h.last_start().data_address.unwrap();
    let token = address.property("authorization").unwrap();
    let access = h.engine.access_validator();
    assert!(access.validate_write(token, "urn:asset:1").await);
    assert!(!access.validate_access(token, DATASET_ADDRESS).await);
}

#[tokio::test]
async fn test_token_refresh() {
    let mut h = TestHarness::new(ProtocolVersion::V2024_1).await;
    h.started("HttpData-PULL").await;
    let address = h.last_start().data_address.unwrap();
    let refresh_token = address.property("refreshToken").unwrap().to_string();

    let body = serde_json::to_vec(&json!({ "refreshToken": refresh_token })).unwrap();
    let response = h.engine.handle_token_refresh(h.version, &body, &h.partner_a).await;
    assert_eq!(response.status, StatusCode::OK);
    let refreshed: RefreshTokenResponse = serde_json::from_slice(response.body.as_deref().unwrap()).unwrap();
    assert_eq!(refreshed.token_type, "Bearer");
    assert_eq!(refreshed.expires_in, 300);
    assert!(h.engine.access_validator().validate_access(&refreshed.access_token, DATASET_ADDRESS).await);

    // Bound to the partner it was issued to
    let response = h.engine.handle_token_refresh(h.version, &body, &h.partner_b).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    // An access token is not a refresh token
    let body = serde_json::to_vec(&json!({ "refreshToken": refreshed.access_token })).unwrap();
    let response = h.engine.handle_token_refresh(h.version, &body, &h.partner_a).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = h.engine.handle_token_refresh(h.version, b"{}", &h.partner_a).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_suspend_resume_complete() {
    let mut h = TestHarness::new(ProtocolVersion::V2024_1).await;
    let pid = h.started("HttpData-PULL").await;
    let engine = h.engine.clone();
    let (v, a) = (h.version, h.partner_a.clone());

    // Resume only applies to a suspended transfer
    let start = codec::encode(v, &TransferStartMessage {
        provider_pid: pid.clone(),
        consumer_pid: TP_CPID.into(),
        data_address: None,
    });
    let response = engine.handle_transfer_start(v, &start, &a, &pid).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(h.transfer(&pid).await.state, TransferState::Started);

    let suspension = codec::encode(v, &TransferSuspensionMessage(interruption(&pid, TP_CPID)));
    let response = engine.handle_transfer_suspension(v, &suspension, &a, &pid).await;
    assert_eq!(response.status, StatusCode::OK);
    let ack: TransferProcess = decode_body(v, &response);
    assert_eq!(ack.state, TransferState::Suspended);

    let response = engine.handle_transfer_start(v, &start, &a, &pid).await;
    assert_eq!(response.status, StatusCode::OK);
    let record = h.transfer(&pid).await;
    assert_eq!(record.state, TransferState::Started);
    assert_eq!(record.dataset_address_url.as_deref(), Some(DATASET_ADDRESS));

    let completion = codec::encode(v, &TransferCompletionMessage {
        provider_pid: pid.clone(),
        consumer_pid: TP_CPID.into(),
    });
    let response = engine.handle_transfer_completion(v, &completion, &a, &pid).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(h.transfer(&pid).await.state, TransferState::Completed);

    // Terminal: a late termination is refused and changes nothing
    let termination = codec::encode(v, &TransferTerminationMessage(interruption(&pid, TP_CPID)));
    let response = engine.handle_transfer_termination(v, &termination, &a, &pid).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(h.transfer(&pid).await.state, TransferState::Completed);
}

#[tokio::test]
async fn test_transfer_pid_mismatch_terminates() {
    let mut h = TestHarness::new(ProtocolVersion::V0_8).await;
    let pid = h.started("HttpData-PULL").await;

    let msg = TransferSuspensionMessage(interruption(&pid, "urn:uuid:someone-else"));
    let response = h
        .engine
        .handle_transfer_suspension(h.version, &codec::encode(h.version, &msg), &h.partner_a, &pid)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let TransferError(error) = decode_body(h.version, &response);
    assert_eq!(error.code.as_deref(), Some("IDENTITY_MISMATCH"));
    assert_eq!(h.transfer(&pid).await.state, TransferState::Terminated);
}

#[tokio::test]
async fn test_transfer_status_is_private() {
    let mut h = TestHarness::new(ProtocolVersion::V2024_1).await;
    let pid = h.started("HttpData-PULL").await;

    let response = h.engine.handle_transfer_status(h.version, &h.partner_a, &pid).await;
    assert_eq!(response.status, StatusCode::OK);
    let ack: TransferProcess = decode_body(h.version, &response);
    assert_eq!(ack.state, TransferState::Started);
    assert_eq!(ack.consumer_pid, TP_CPID);

    let response = h.engine.handle_transfer_status(h.version, &h.partner_b, &pid).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(h.transfer(&pid).await.state, TransferState::Started);
}

#[tokio::test]
async fn test_access_token_outlives_one_rotation_only() {
    let mut h = TestHarness::new(ProtocolVersion::V2024_1).await;
    h.started("HttpData-PULL").await;
    let token = h
        .last_start()
        .data_address
        .unwrap()
        .property("authorization")
        .unwrap()
        .to_string();
    assert!(h.engine.access_validator().validate_access(&token, DATASET_ADDRESS).await);

    // Rotating twice retires the signing key
    h.engine.tokens().rotate();
    assert!(h.engine.access_validator().validate_access(&token, DATASET_ADDRESS).await);
    h.engine.tokens().rotate();
    assert!(!h.engine.access_validator().validate_access(&token, DATASET_ADDRESS).await);
}

// ============================================================================
// Gateway
// ============================================================================

#[tokio::test]
async fn test_gateway_routes() {
    let h = TestHarness::new(ProtocolVersion::V2024_1).await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let app = crate::gateway::router(h.engine.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let http = reqwest::Client::new();

    let versions: Value = http
        .get(format!("{}/.well-known/dspace-version", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(versions["protocolVersions"].as_array().unwrap().len(), 3);
    assert_eq!(versions["protocolVersions"][0]["path"], "/");
    assert_eq!(versions["protocolVersions"][1]["version"], "2024-1");

    for version in ProtocolVersion::ALL {
        let body = codec::encode(version, &ContractRequestMessage {
            provider_pid: None,
            consumer_pid: NEG_CPID.into(),
            offer: offer(),
            callback_address: CONSUMER_DSP.into(),
        });
        let url = format!("{}{}/negotiations/request", base, version.path_prefix());

        let response = http.post(&url).body(body.clone()).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 401, "{}", version);

        let response = http
            .post(&url)
            .bearer_auth("token-a")
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201, "{}", version);
        let bytes = response.bytes().await.unwrap();
        let ack: ContractNegotiation = codec::decode(version, &bytes).unwrap();

        let status = http
            .get(format!("{}{}/negotiations/{}", base, version.path_prefix(), ack.provider_pid))
            .bearer_auth("token-b")
            .send()
            .await
            .unwrap();
        assert_eq!(status.status().as_u16(), 404);
    }
}
