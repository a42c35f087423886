//! Protocol messages
//!
//! One struct per message kind. Process ids are carried as the strings found
//! on the wire; handlers parse them.

use serde_json::{Map, Value};

use super::dialect::Dialect;
use super::vocab::{self, Term};
use crate::negotiation::NegotiationState;
use crate::transfer::TransferState;

/// A message the codec can read and write.
pub trait WireMessage: Sized {
    /// `@type` of the message
    const TYPE: Term;

    /// Read from a prepared document whose `@type` already matched.
    fn read(d: Dialect, node: &Value) -> Option<Self>;

    /// Add the message fields to a document started by [`Dialect::begin`].
    fn write(&self, d: Dialect, out: &mut Map<String, Value>);
}

fn read_pids(d: Dialect, node: &Value) -> Option<(String, String)> {
    Some((
        d.get_str(node, vocab::PROVIDER_PID)?,
        d.get_str(node, vocab::CONSUMER_PID)?,
    ))
}

fn write_pids(d: Dialect, out: &mut Map<String, Value>, provider_pid: &str, consumer_pid: &str) {
    d.put_str(out, vocab::PROVIDER_PID, provider_pid);
    d.put_str(out, vocab::CONSUMER_PID, consumer_pid);
}

// ============================================================================
// Negotiation
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ContractRequestMessage {
    /// Present only on counter-requests
    pub provider_pid: Option<String>,
    pub consumer_pid: String,
    /// Requested offer, compact form
    pub offer: Value,
    pub callback_address: String,
}

impl ContractRequestMessage {
    /// Offer `@id`
    pub fn offer_id(&self) -> Option<&str> {
        self.offer.get("@id").and_then(Value::as_str)
    }

    /// Asset the offer targets
    pub fn target(&self) -> Option<&str> {
        self.offer.get("target").and_then(Value::as_str)
    }
}

impl WireMessage for ContractRequestMessage {
    const TYPE: Term = vocab::CONTRACT_REQUEST_MESSAGE;

    fn read(d: Dialect, node: &Value) -> Option<Self> {
        Some(Self {
            provider_pid: d.get_str(node, vocab::PROVIDER_PID),
            consumer_pid: d.get_str(node, vocab::CONSUMER_PID)?,
            offer: d.get_policy(node, vocab::OFFER)?,
            callback_address: d.get_str(node, vocab::CALLBACK_ADDRESS)?,
        })
    }

    fn write(&self, d: Dialect, out: &mut Map<String, Value>) {
        if let Some(pid) = &self.provider_pid {
            d.put_str(out, vocab::PROVIDER_PID, pid);
        }
        d.put_str(out, vocab::CONSUMER_PID, &self.consumer_pid);
        d.put_policy(out, vocab::OFFER, &self.offer);
        d.put_str(out, vocab::CALLBACK_ADDRESS, &self.callback_address);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractAgreementMessage {
    pub provider_pid: String,
    pub consumer_pid: String,
    /// Agreement policy, compact form; `@id` is the contract id
    pub agreement: Value,
    pub callback_address: Option<String>,
}

impl ContractAgreementMessage {
    pub fn agreement_id(&self) -> Option<&str> {
        self.agreement.get("@id").and_then(Value::as_str)
    }
}

impl WireMessage for ContractAgreementMessage {
    const TYPE: Term = vocab::CONTRACT_AGREEMENT_MESSAGE;

    fn read(d: Dialect, node: &Value) -> Option<Self> {
        let (provider_pid, consumer_pid) = read_pids(d, node)?;
        Some(Self {
            provider_pid,
            consumer_pid,
            agreement: d.get_policy(node, vocab::AGREEMENT)?,
            callback_address: d.get_str(node, vocab::CALLBACK_ADDRESS),
        })
    }

    fn write(&self, d: Dialect, out: &mut Map<String, Value>) {
        write_pids(d, out, &self.provider_pid, &self.consumer_pid);
        d.put_policy(out, vocab::AGREEMENT, &self.agreement);
        if let Some(callback) = &self.callback_address {
            d.put_str(out, vocab::CALLBACK_ADDRESS, callback);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractAgreementVerificationMessage {
    pub provider_pid: String,
    pub consumer_pid: String,
}

impl WireMessage for ContractAgreementVerificationMessage {
    const TYPE: Term = vocab::CONTRACT_AGREEMENT_VERIFICATION_MESSAGE;

    fn read(d: Dialect, node: &Value) -> Option<Self> {
        let (provider_pid, consumer_pid) = read_pids(d, node)?;
        Some(Self {
            provider_pid,
            consumer_pid,
        })
    }

    fn write(&self, d: Dialect, out: &mut Map<String, Value>) {
        write_pids(d, out, &self.provider_pid, &self.consumer_pid);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationEventType {
    Accepted,
    Finalized,
}

impl NegotiationEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationEventType::Accepted => "ACCEPTED",
            NegotiationEventType::Finalized => "FINALIZED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACCEPTED" => Some(NegotiationEventType::Accepted),
            "FINALIZED" => Some(NegotiationEventType::Finalized),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractNegotiationEventMessage {
    pub provider_pid: String,
    pub consumer_pid: String,
    pub event_type: NegotiationEventType,
}

impl WireMessage for ContractNegotiationEventMessage {
    const TYPE: Term = vocab::CONTRACT_NEGOTIATION_EVENT_MESSAGE;

    fn read(d: Dialect, node: &Value) -> Option<Self> {
        let (provider_pid, consumer_pid) = read_pids(d, node)?;
        let event_type = NegotiationEventType::parse(&d.get_enum(node, vocab::EVENT_TYPE)?)?;
        Some(Self {
            provider_pid,
            consumer_pid,
            event_type,
        })
    }

    fn write(&self, d: Dialect, out: &mut Map<String, Value>) {
        write_pids(d, out, &self.provider_pid, &self.consumer_pid);
        d.put_enum(out, vocab::EVENT_TYPE, self.event_type.as_str());
    }
}

/// Termination-style body shared by negotiation termination and transfer
/// suspension/termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInterruption {
    pub provider_pid: String,
    pub consumer_pid: String,
    pub code: Option<String>,
    pub reason: Vec<String>,
}

impl ProcessInterruption {
    fn read(d: Dialect, node: &Value) -> Option<Self> {
        let (provider_pid, consumer_pid) = read_pids(d, node)?;
        Some(Self {
            provider_pid,
            consumer_pid,
            code: d.get_str(node, vocab::CODE),
            reason: d.get_strs(node, vocab::REASON),
        })
    }

    fn write(&self, d: Dialect, out: &mut Map<String, Value>) {
        write_pids(d, out, &self.provider_pid, &self.consumer_pid);
        if let Some(code) = &self.code {
            d.put_str(out, vocab::CODE, code);
        }
        if !self.reason.is_empty() {
            d.put_strs(out, vocab::REASON, &self.reason);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractNegotiationTerminationMessage(pub ProcessInterruption);

impl WireMessage for ContractNegotiationTerminationMessage {
    const TYPE: Term = vocab::CONTRACT_NEGOTIATION_TERMINATION_MESSAGE;

    fn read(d: Dialect, node: &Value) -> Option<Self> {
        ProcessInterruption::read(d, node).map(Self)
    }

    fn write(&self, d: Dialect, out: &mut Map<String, Value>) {
        self.0.write(d, out)
    }
}

/// Negotiation acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractNegotiation {
    pub provider_pid: String,
    pub consumer_pid: String,
    pub state: NegotiationState,
}

impl WireMessage for ContractNegotiation {
    const TYPE: Term = vocab::CONTRACT_NEGOTIATION;

    fn read(d: Dialect, node: &Value) -> Option<Self> {
        let (provider_pid, consumer_pid) = read_pids(d, node)?;
        let state = d.get_enum(node, vocab::STATE)?.parse().ok()?;
        Some(Self {
            provider_pid,
            consumer_pid,
            state,
        })
    }

    fn write(&self, d: Dialect, out: &mut Map<String, Value>) {
        write_pids(d, out, &self.provider_pid, &self.consumer_pid);
        d.put_enum(out, vocab::STATE, self.state.as_str());
    }
}

/// Error body; either pid may be unknown when the request never resolved.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessError {
    pub provider_pid: Option<String>,
    pub consumer_pid: Option<String>,
    pub code: Option<String>,
    pub reason: Vec<String>,
}

impl ProcessError {
    fn read(d: Dialect, node: &Value) -> Self {
        Self {
            provider_pid: d.get_str(node, vocab::PROVIDER_PID),
            consumer_pid: d.get_str(node, vocab::CONSUMER_PID),
            code: d.get_str(node, vocab::CODE),
            reason: d.get_strs(node, vocab::REASON),
        }
    }

    fn write(&self, d: Dialect, out: &mut Map<String, Value>) {
        if let Some(pid) = &self.provider_pid {
            d.put_str(out, vocab::PROVIDER_PID, pid);
        }
        if let Some(pid) = &self.consumer_pid {
            d.put_str(out, vocab::CONSUMER_PID, pid);
        }
        if let Some(code) = &self.code {
            d.put_str(out, vocab::CODE, code);
        }
        d.put_strs(out, vocab::REASON, &self.reason);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractNegotiationError(pub ProcessError);

impl WireMessage for ContractNegotiationError {
    const TYPE: Term = vocab::CONTRACT_NEGOTIATION_ERROR;

    fn read(d: Dialect, node: &Value) -> Option<Self> {
        Some(Self(ProcessError::read(d, node)))
    }

    fn write(&self, d: Dialect, out: &mut Map<String, Value>) {
        self.0.write(d, out)
    }
}

// ============================================================================
// Transfer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointProperty {
    pub name: String,
    pub value: String,
}

/// Where and how the consumer reaches the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataAddress {
    pub endpoint_type: String,
    pub endpoint: Option<String>,
    pub properties: Vec<EndpointProperty>,
}

impl DataAddress {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    fn read(d: Dialect, node: &Value) -> Option<Self> {
        let properties = d
            .get_nodes(node, vocab::ENDPOINT_PROPERTIES)
            .into_iter()
            .filter_map(|p| {
                Some(EndpointProperty {
                    name: d.get_str(p, vocab::NAME)?,
                    value: d.get_str(p, vocab::VALUE)?,
                })
            })
            .collect();
        Some(Self {
            endpoint_type: d.get_str(node, vocab::ENDPOINT_TYPE)?,
            endpoint: d.get_str(node, vocab::ENDPOINT),
            properties,
        })
    }

    fn write(&self, d: Dialect) -> Map<String, Value> {
        let mut out = d.begin_nested(vocab::DATA_ADDRESS);
        d.put_str(&mut out, vocab::ENDPOINT_TYPE, &self.endpoint_type);
        if let Some(endpoint) = &self.endpoint {
            d.put_str(&mut out, vocab::ENDPOINT, endpoint);
        }
        let properties = self
            .properties
            .iter()
            .map(|p| {
                let mut prop = d.begin_nested(vocab::ENDPOINT_PROPERTY);
                d.put_str(&mut prop, vocab::NAME, &p.name);
                d.put_str(&mut prop, vocab::VALUE, &p.value);
                prop
            })
            .collect();
        d.put_nodes(&mut out, vocab::ENDPOINT_PROPERTIES, properties);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequestMessage {
    pub consumer_pid: String,
    pub agreement_id: String,
    pub format: String,
    pub callback_address: String,
    /// Push transfers only
    pub data_address: Option<DataAddress>,
}

impl WireMessage for TransferRequestMessage {
    const TYPE: Term = vocab::TRANSFER_REQUEST_MESSAGE;

    fn read(d: Dialect, node: &Value) -> Option<Self> {
        let data_address = match d.get_node(node, vocab::DATA_ADDRESS_FIELD) {
            Some(n) => Some(DataAddress::read(d, n)?),
            None => None,
        };
        Some(Self {
            consumer_pid: d.get_str(node, vocab::CONSUMER_PID)?,
            agreement_id: d.get_str(node, vocab::AGREEMENT_ID)?,
            format: d.get_str(node, vocab::FORMAT)?,
            callback_address: d.get_str(node, vocab::CALLBACK_ADDRESS)?,
            data_address,
        })
    }

    fn write(&self, d: Dialect, out: &mut Map<String, Value>) {
        d.put_str(out, vocab::CONSUMER_PID, &self.consumer_pid);
        d.put_str(out, vocab::AGREEMENT_ID, &self.agreement_id);
        d.put_str(out, vocab::FORMAT, &self.format);
        d.put_str(out, vocab::CALLBACK_ADDRESS, &self.callback_address);
        if let Some(address) = &self.data_address {
            d.put_node(out, vocab::DATA_ADDRESS_FIELD, address.write(d));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferStartMessage {
    pub provider_pid: String,
    pub consumer_pid: String,
    pub data_address: Option<DataAddress>,
}

impl WireMessage for TransferStartMessage {
    const TYPE: Term = vocab::TRANSFER_START_MESSAGE;

    fn read(d: Dialect, node: &Value) -> Option<Self> {
        let (provider_pid, consumer_pid) = read_pids(d, node)?;
        let data_address = match d.get_node(node, vocab::DATA_ADDRESS_FIELD) {
            Some(n) => Some(DataAddress::read(d, n)?),
            None => None,
        };
        Some(Self {
            provider_pid,
            consumer_pid,
            data_address,
        })
    }

    fn write(&self, d: Dialect, out: &mut Map<String, Value>) {
        write_pids(d, out, &self.provider_pid, &self.consumer_pid);
        if let Some(address) = &self.data_address {
            d.put_node(out, vocab::DATA_ADDRESS_FIELD, address.write(d));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSuspensionMessage(pub ProcessInterruption);

impl WireMessage for TransferSuspensionMessage {
    const TYPE: Term = vocab::TRANSFER_SUSPENSION_MESSAGE;

    fn read(d: Dialect, node: &Value) -> Option<Self> {
        ProcessInterruption::read(d, node).map(Self)
    }

    fn write(&self, d: Dialect, out: &mut Map<String, Value>) {
        self.0.write(d, out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTerminationMessage(pub ProcessInterruption);

impl WireMessage for TransferTerminationMessage {
    const TYPE: Term = vocab::TRANSFER_TERMINATION_MESSAGE;

    fn read(d: Dialect, node: &Value) -> Option<Self> {
        ProcessInterruption::read(d, node).map(Self)
    }

    fn write(&self, d: Dialect, out: &mut Map<String, Value>) {
        self.0.write(d, out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCompletionMessage {
    pub provider_pid: String,
    pub consumer_pid: String,
}

impl WireMessage for TransferCompletionMessage {
    const TYPE: Term = vocab::TRANSFER_COMPLETION_MESSAGE;

    fn read(d: Dialect, node: &Value) -> Option<Self> {
        let (provider_pid, consumer_pid) = read_pids(d, node)?;
        Some(Self {
            provider_pid,
            consumer_pid,
        })
    }

    fn write(&self, d: Dialect, out: &mut Map<String, Value>) {
        write_pids(d, out, &self.provider_pid, &self.consumer_pid);
    }
}

/// Transfer acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProcess {
    pub provider_pid: String,
    pub consumer_pid: String,
    pub state: TransferState,
}

impl WireMessage for TransferProcess {
    const TYPE: Term = vocab::TRANSFER_PROCESS;

    fn read(d: Dialect, node: &Value) -> Option<Self> {
        let (provider_pid, consumer_pid) = read_pids(d, node)?;
        let state = d.get_enum(node, vocab::STATE)?.parse().ok()?;
        Some(Self {
            provider_pid,
            consumer_pid,
            state,
        })
    }

    fn write(&self, d: Dialect, out: &mut Map<String, Value>) {
        write_pids(d, out, &self.provider_pid, &self.consumer_pid);
        d.put_enum(out, vocab::STATE, self.state.as_str());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferError(pub ProcessError);

impl WireMessage for TransferError {
    const TYPE: Term = vocab::TRANSFER_ERROR;

    fn read(d: Dialect, node: &Value) -> Option<Self> {
        Some(Self(ProcessError::read(d, node)))
    }

    fn write(&self, d: Dialect, out: &mut Map<String, Value>) {
        self.0.write(d, out)
    }
}
