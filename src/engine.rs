//! Protocol Engine
//!
//! Wires the state machines, token service, collaborators and dispatcher
//! together. The per-message handlers live in `negotiation::api` and
//! `transfer::api` as `impl ProtocolEngine` blocks; each takes the raw body,
//! the caller identity and path parameters and returns a
//! [`ProtocolResponse`]. Handlers never return errors: every failure is
//! rendered as an error message in the caller's wire format.

use axum::http::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::adapters::{
    AssetResolver, IdentityValidator, OfferValidator, PartnerIdentity, PartnerTokenProvider,
    StaticAssetCatalog, StaticIdentityValidator, StaticOfferValidator, StaticPartnerTokenProvider,
};
use crate::codec::{self, ContractNegotiationError, ProcessError, ProtocolVersion, TransferError, WireMessage};
use crate::config::AppConfig;
use crate::dispatch::{DispatchContext, DispatchReceiver, DispatchSender, PartnerClient, dispatch_channel};
use crate::error::ProtocolError;
use crate::negotiation::NegotiationMachine;
use crate::store::InMemoryStore;
use crate::token::{AccessTokenValidator, TokenService};
use crate::transfer::TransferMachine;

/// Status plus optional encoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolResponse {
    pub status: StatusCode,
    pub body: Option<Vec<u8>>,
}

impl ProtocolResponse {
    pub fn new(status: StatusCode, body: Option<Vec<u8>>) -> Self {
        Self { status, body }
    }

    pub fn message<T: WireMessage>(status: StatusCode, version: ProtocolVersion, message: &T) -> Self {
        Self::new(status, Some(codec::encode(version, message)))
    }

    /// Body parsed as JSON
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(self.body.as_deref()?).ok()
    }
}

/// A handler failure with whatever process ids were known when it happened.
#[derive(Debug, Clone)]
pub struct Failure {
    pub error: ProtocolError,
    pub provider_pid: Option<String>,
    pub consumer_pid: Option<String>,
}

impl Failure {
    pub fn with_pids(mut self, provider_pid: Option<String>, consumer_pid: Option<String>) -> Self {
        self.provider_pid = self.provider_pid.or(provider_pid);
        self.consumer_pid = self.consumer_pid.or(consumer_pid);
        self
    }

    fn body(&self) -> ProcessError {
        ProcessError {
            provider_pid: self.provider_pid.clone(),
            consumer_pid: self.consumer_pid.clone(),
            code: Some(self.error.code().to_string()),
            reason: vec![self.error.to_string()],
        }
    }

    fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<ProtocolError> for Failure {
    fn from(error: ProtocolError) -> Self {
        Self {
            error,
            provider_pid: None,
            consumer_pid: None,
        }
    }
}

/// Config-backed collaborator set.
pub struct Collaborators {
    pub identity: Arc<dyn IdentityValidator>,
    pub offers: Arc<dyn OfferValidator>,
    pub assets: Arc<dyn AssetResolver>,
    pub partner_tokens: Arc<dyn PartnerTokenProvider>,
}

impl Collaborators {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            identity: Arc::new(StaticIdentityValidator::new(&config.partners)),
            offers: Arc::new(StaticOfferValidator::new(&config.assets)),
            assets: Arc::new(StaticAssetCatalog::new(&config.assets, &config.provider.data_plane_url)),
            partner_tokens: Arc::new(StaticPartnerTokenProvider::new(&config.partners)),
        }
    }
}

pub struct ProtocolEngine {
    pub(crate) negotiations: Arc<NegotiationMachine>,
    pub(crate) transfers: Arc<TransferMachine>,
    pub(crate) tokens: Arc<TokenService>,
    pub(crate) access: AccessTokenValidator,
    pub(crate) identity: Arc<dyn IdentityValidator>,
    pub(crate) offers: Arc<dyn OfferValidator>,
    pub(crate) assets: Arc<dyn AssetResolver>,
    pub(crate) dispatcher: DispatchSender,
}

impl ProtocolEngine {
    /// Build the engine over an in-memory store.
    ///
    /// Returns the engine plus what the worker pool needs: the dispatch
    /// context and the receiving end of the queue.
    pub fn build(
        config: &AppConfig,
        collaborators: Collaborators,
        client: Arc<dyn PartnerClient>,
    ) -> (Arc<ProtocolEngine>, Arc<DispatchContext>, DispatchReceiver) {
        let store = Arc::new(InMemoryStore::new());
        let negotiations = Arc::new(NegotiationMachine::new(store.clone()));
        let transfers = Arc::new(TransferMachine::new(store));
        let tokens = Arc::new(TokenService::new(config.token.clone()));
        let (dispatcher, receiver) = dispatch_channel(config.dispatcher.queue_size);

        let context = Arc::new(DispatchContext {
            negotiations: negotiations.clone(),
            transfers: transfers.clone(),
            tokens: tokens.clone(),
            assets: collaborators.assets.clone(),
            partner_tokens: collaborators.partner_tokens,
            client,
            provider: config.provider.clone(),
        });

        let engine = Arc::new(ProtocolEngine {
            access: AccessTokenValidator::new(tokens.clone(), negotiations.clone()),
            negotiations,
            transfers,
            tokens,
            identity: collaborators.identity,
            offers: collaborators.offers,
            assets: collaborators.assets,
            dispatcher,
        });
        (engine, context, receiver)
    }

    /// Resolve the caller from the `Authorization` header.
    pub async fn identify(&self, authorization: Option<&str>) -> Option<PartnerIdentity> {
        self.identity.resolve(authorization).await
    }

    pub fn access_validator(&self) -> &AccessTokenValidator {
        &self.access
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    pub(crate) fn negotiation_failure(&self, version: ProtocolVersion, failure: Failure) -> ProtocolResponse {
        log_failure("negotiation", version, &failure);
        ProtocolResponse::message(failure.status(), version, &ContractNegotiationError(failure.body()))
    }

    pub(crate) fn transfer_failure(&self, version: ProtocolVersion, failure: Failure) -> ProtocolResponse {
        log_failure("transfer", version, &failure);
        ProtocolResponse::message(failure.status(), version, &TransferError(failure.body()))
    }
}

fn log_failure(process: &str, version: ProtocolVersion, failure: &Failure) {
    warn!(
        process,
        version = %version,
        code = failure.error.code(),
        provider_pid = ?failure.provider_pid,
        consumer_pid = ?failure.consumer_pid,
        error = %failure.error,
        "Request rejected"
    );
}
