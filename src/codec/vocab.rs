//! Protocol vocabulary
//!
//! Every field and type name the codec reads or writes, tagged with its
//! namespace so each dialect can render it: `providerPid` in the compact
//! form, `dspace:providerPid` / `https://w3id.org/dspace/v0.8/providerPid`
//! in the legacy form.

pub const DSPACE_NS: &str = "https://w3id.org/dspace/v0.8/";
pub const ODRL_NS: &str = "http://www.w3.org/ns/odrl/2/";
pub const DCT_NS: &str = "http://purl.org/dc/terms/";
pub const DCAT_NS: &str = "http://www.w3.org/ns/dcat#";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ns {
    Dspace,
    Odrl,
    Dct,
    Dcat,
}

impl Ns {
    pub const ALL: [Ns; 4] = [Ns::Dspace, Ns::Odrl, Ns::Dct, Ns::Dcat];

    pub fn prefix(&self) -> &'static str {
        match self {
            Ns::Dspace => "dspace",
            Ns::Odrl => "odrl",
            Ns::Dct => "dct",
            Ns::Dcat => "dcat",
        }
    }

    pub fn iri(&self) -> &'static str {
        match self {
            Ns::Dspace => DSPACE_NS,
            Ns::Odrl => ODRL_NS,
            Ns::Dct => DCT_NS,
            Ns::Dcat => DCAT_NS,
        }
    }
}

/// A namespaced name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Term {
    pub ns: Ns,
    pub name: &'static str,
}

impl Term {
    pub const fn dspace(name: &'static str) -> Self {
        Self { ns: Ns::Dspace, name }
    }

    pub const fn odrl(name: &'static str) -> Self {
        Self { ns: Ns::Odrl, name }
    }

    pub const fn dct(name: &'static str) -> Self {
        Self { ns: Ns::Dct, name }
    }

    /// `dspace:providerPid`
    pub fn prefixed(&self) -> String {
        format!("{}:{}", self.ns.prefix(), self.name)
    }

    /// `https://w3id.org/dspace/v0.8/providerPid`
    pub fn iri(&self) -> String {
        format!("{}{}", self.ns.iri(), self.name)
    }
}

/// Strip a known namespace from an absolute IRI.
pub fn local_name(iri: &str) -> Option<&str> {
    Ns::ALL
        .iter()
        .find_map(|ns| iri.strip_prefix(ns.iri()))
        .filter(|rest| !rest.is_empty())
}

// Message types
pub const CONTRACT_REQUEST_MESSAGE: Term = Term::dspace("ContractRequestMessage");
pub const CONTRACT_AGREEMENT_MESSAGE: Term = Term::dspace("ContractAgreementMessage");
pub const CONTRACT_AGREEMENT_VERIFICATION_MESSAGE: Term =
    Term::dspace("ContractAgreementVerificationMessage");
pub const CONTRACT_NEGOTIATION_EVENT_MESSAGE: Term = Term::dspace("ContractNegotiationEventMessage");
pub const CONTRACT_NEGOTIATION_TERMINATION_MESSAGE: Term =
    Term::dspace("ContractNegotiationTerminationMessage");
pub const CONTRACT_NEGOTIATION: Term = Term::dspace("ContractNegotiation");
pub const CONTRACT_NEGOTIATION_ERROR: Term = Term::dspace("ContractNegotiationError");
pub const TRANSFER_REQUEST_MESSAGE: Term = Term::dspace("TransferRequestMessage");
pub const TRANSFER_START_MESSAGE: Term = Term::dspace("TransferStartMessage");
pub const TRANSFER_SUSPENSION_MESSAGE: Term = Term::dspace("TransferSuspensionMessage");
pub const TRANSFER_COMPLETION_MESSAGE: Term = Term::dspace("TransferCompletionMessage");
pub const TRANSFER_TERMINATION_MESSAGE: Term = Term::dspace("TransferTerminationMessage");
pub const TRANSFER_PROCESS: Term = Term::dspace("TransferProcess");
pub const TRANSFER_ERROR: Term = Term::dspace("TransferError");
pub const DATA_ADDRESS: Term = Term::dspace("DataAddress");
pub const ENDPOINT_PROPERTY: Term = Term::dspace("EndpointProperty");

// Fields
pub const PROVIDER_PID: Term = Term::dspace("providerPid");
pub const CONSUMER_PID: Term = Term::dspace("consumerPid");
pub const OFFER: Term = Term::dspace("offer");
pub const AGREEMENT: Term = Term::dspace("agreement");
pub const CALLBACK_ADDRESS: Term = Term::dspace("callbackAddress");
pub const EVENT_TYPE: Term = Term::dspace("eventType");
pub const CODE: Term = Term::dspace("code");
pub const REASON: Term = Term::dspace("reason");
pub const STATE: Term = Term::dspace("state");
pub const AGREEMENT_ID: Term = Term::dspace("agreementId");
pub const FORMAT: Term = Term::dct("format");
pub const DATA_ADDRESS_FIELD: Term = Term::dspace("dataAddress");
pub const ENDPOINT_TYPE: Term = Term::dspace("endpointType");
pub const ENDPOINT: Term = Term::dspace("endpoint");
pub const ENDPOINT_PROPERTIES: Term = Term::dspace("endpointProperties");
pub const NAME: Term = Term::dspace("name");
pub const VALUE: Term = Term::dspace("value");

/// Policy keys living in the dspace namespace; every other policy key is ODRL.
pub const DSPACE_POLICY_KEYS: &[&str] = &["timestamp"];

/// Policy keys whose string values are vocabulary terms (`use`, `eq`, ...).
pub const VOCAB_VALUED_POLICY_KEYS: &[&str] = &["action", "leftOperand", "operator"];

/// Policy keys whose string values are identifiers.
pub const ID_VALUED_POLICY_KEYS: &[&str] = &["target", "assigner", "assignee"];

/// Namespace of a compact policy key.
pub fn policy_ns(key: &str) -> Ns {
    if DSPACE_POLICY_KEYS.contains(&key) {
        Ns::Dspace
    } else {
        Ns::Odrl
    }
}
