//! Public codec and token API, driven with hand-written wire documents.

use serde_json::json;

use dsp_provider::codec::policy::policies_match;
use dsp_provider::codec::version::COMPACT_CONTEXT;
use dsp_provider::codec::{
    self, ContractNegotiation, ContractRequestMessage, TransferRequestMessage,
    TransferTerminationMessage,
};
use dsp_provider::config::TokenConfig;
use dsp_provider::token::{TokenKind, TokenService};
use dsp_provider::{NegotiationState, ProtocolVersion};

const CONSUMER_PID: &str = "urn:uuid:0b7f1e3a-9d2c-4e6b-8f5a-3c1d2e4f5a66";
const PROVIDER_PID: &str = "urn:uuid:8c5d3f6e-2a34-4a8c-9a3e-7a2f5d0c1b11";

#[test]
fn legacy_contract_request_reads_like_compact() {
    let legacy = json!({
        "@context": {
            "dspace": "https://w3id.org/dspace/v0.8/",
            "odrl": "http://www.w3.org/ns/odrl/2/"
        },
        "@type": "dspace:ContractRequestMessage",
        "dspace:consumerPid": CONSUMER_PID,
        "dspace:callbackAddress": "https://consumer.example/dsp",
        "dspace:offer": {
            "@type": "odrl:Offer",
            "@id": "urn:uuid:offer-legacy",
            "odrl:target": {"@id": "urn:asset:1"},
            "odrl:permission": [{"odrl:action": {"@id": "odrl:use"}}]
        }
    });
    let compact = json!({
        "@context": COMPACT_CONTEXT,
        "@type": "ContractRequestMessage",
        "consumerPid": CONSUMER_PID,
        "callbackAddress": "https://consumer.example/dsp",
        "offer": {
            "@type": "Offer",
            "@id": "urn:uuid:offer-compact",
            "target": "urn:asset:1",
            "permission": [{"action": "use"}]
        }
    });

    let from_legacy: ContractRequestMessage =
        codec::decode_value(ProtocolVersion::V0_8, legacy).expect("legacy request");
    let from_compact: ContractRequestMessage =
        codec::decode_value(ProtocolVersion::V2024_1, compact).expect("compact request");

    assert_eq!(from_legacy.consumer_pid, from_compact.consumer_pid);
    assert_eq!(from_legacy.target(), Some("urn:asset:1"));
    assert_eq!(from_legacy.provider_pid, None);
    // Same policy, different offer ids
    assert!(policies_match(&from_compact.offer, &from_legacy.offer));
}

#[test]
fn compact_requires_its_context() {
    let doc = json!({
        "@type": "TransferRequestMessage",
        "consumerPid": CONSUMER_PID,
        "agreementId": "urn:uuid:agreement-1",
        "format": "HttpData-PULL",
        "callbackAddress": "https://consumer.example/dsp"
    });
    assert!(codec::decode_value::<TransferRequestMessage>(ProtocolVersion::V2024_1, doc.clone()).is_none());

    let mut with_context = doc;
    with_context["@context"] = json!([COMPACT_CONTEXT]);
    let msg: TransferRequestMessage =
        codec::decode_value(ProtocolVersion::V2025_1, with_context).expect("transfer request");
    assert_eq!(msg.agreement_id, "urn:uuid:agreement-1");
    assert_eq!(msg.format, "HttpData-PULL");
    assert!(msg.data_address.is_none());
}

#[test]
fn wrong_type_or_missing_field_is_rejected() {
    let wrong_type = json!({
        "@context": COMPACT_CONTEXT,
        "@type": "TransferStartMessage",
        "providerPid": PROVIDER_PID,
        "consumerPid": CONSUMER_PID
    });
    assert!(codec::decode_value::<TransferTerminationMessage>(ProtocolVersion::V2024_1, wrong_type).is_none());

    let missing = json!({
        "@context": COMPACT_CONTEXT,
        "@type": "TransferTerminationMessage",
        "consumerPid": CONSUMER_PID
    });
    assert!(codec::decode_value::<TransferTerminationMessage>(ProtocolVersion::V2024_1, missing).is_none());

    assert!(codec::decode::<TransferTerminationMessage>(ProtocolVersion::V0_8, b"not json").is_none());
}

#[test]
fn compact_ack_shape() {
    let ack = ContractNegotiation {
        provider_pid: PROVIDER_PID.into(),
        consumer_pid: CONSUMER_PID.into(),
        state: NegotiationState::Agreed,
    };
    let doc = codec::encode_value(ProtocolVersion::V2024_1, &ack);
    assert_eq!(doc["@context"], COMPACT_CONTEXT);
    assert_eq!(doc["@type"], "ContractNegotiation");
    assert_eq!(doc["providerPid"], PROVIDER_PID);
    assert_eq!(doc["state"], "AGREED");

    let legacy = codec::encode_value(ProtocolVersion::V0_8, &ack);
    assert_eq!(legacy["@type"], "dspace:ContractNegotiation");
    let back: ContractNegotiation = codec::decode_value(ProtocolVersion::V0_8, legacy).unwrap();
    assert_eq!(back, ack);
}

#[test]
fn issued_tokens_carry_their_grant() {
    let service = TokenService::new(TokenConfig::default());
    let address = "https://data.provider.example/datasets/1";

    let access = service.issue_data_access_token("urn:uuid:contract-1", address).unwrap();
    let refresh = service.issue_refresh_token(&access, "urn:consumer:a").unwrap();
    assert!(service.validate(&access));
    assert!(service.validate(&refresh));

    let claims = service.extract_claims(&access).unwrap();
    assert_eq!(service.kind_of(&claims), Some(TokenKind::DataAccess));
    assert_eq!(claims.data_address.as_deref(), Some(address));
    assert_eq!(claims.contract_id.as_deref(), Some("urn:uuid:contract-1"));

    let refresh_claims = service.extract_claims(&refresh).unwrap();
    assert_eq!(service.kind_of(&refresh_claims), Some(TokenKind::Refresh));
    assert_eq!(refresh_claims.wrapped_token.as_deref(), Some(access.as_str()));

    let mut tampered = access.clone();
    tampered.push('x');
    assert!(!service.validate(&tampered));
}
