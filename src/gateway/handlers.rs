//! HTTP handlers
//!
//! Each handler unpacks path, body and caller and delegates to the engine.
//! Nothing here inspects message content.

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::debug;

use super::state::VersionState;
use crate::adapters::PartnerIdentity;
use crate::codec::ProtocolVersion;
use crate::engine::{Failure, ProtocolResponse};
use crate::error::ProtocolError;

impl IntoResponse for ProtocolResponse {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) => (self.status, [(header::CONTENT_TYPE, "application/json")], body).into_response(),
            None => self.status.into_response(),
        }
    }
}

/// Resolve the caller from `Authorization` and attach it as an extension.
///
/// Unknown callers get 401 with an error document of the addressed process.
pub async fn identify_caller(
    State(state): State<VersionState>,
    mut request: Request,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let is_transfer = request.uri().path().contains("/transfers");

    match state.engine.identify(authorization.as_deref()).await {
        Some(identity) => {
            debug!(partner_id = %identity.partner_id, path = %request.uri().path(), "Caller identified");
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        None => {
            let failure = Failure::from(ProtocolError::Unauthorized("unknown caller".into()));
            let response = if is_transfer {
                state.engine.transfer_failure(state.version, failure)
            } else {
                state.engine.negotiation_failure(state.version, failure)
            };
            response.into_response()
        }
    }
}

// ============================================================
// Negotiation
// ============================================================

pub async fn contract_request(
    State(state): State<VersionState>,
    Extension(caller): Extension<PartnerIdentity>,
    body: Bytes,
) -> ProtocolResponse {
    state
        .engine
        .handle_contract_request(state.version, &body, &caller)
        .await
}

pub async fn negotiation_status(
    State(state): State<VersionState>,
    Extension(caller): Extension<PartnerIdentity>,
    Path(pid): Path<String>,
) -> ProtocolResponse {
    state
        .engine
        .handle_negotiation_status(state.version, &caller, &pid)
        .await
}

pub async fn contract_verification(
    State(state): State<VersionState>,
    Extension(caller): Extension<PartnerIdentity>,
    Path(pid): Path<String>,
    body: Bytes,
) -> ProtocolResponse {
    state
        .engine
        .handle_contract_verification(state.version, &body, &caller, &pid)
        .await
}

pub async fn negotiation_termination(
    State(state): State<VersionState>,
    Extension(caller): Extension<PartnerIdentity>,
    Path(pid): Path<String>,
    body: Bytes,
) -> ProtocolResponse {
    state
        .engine
        .handle_negotiation_termination(state.version, &body, &caller, &pid)
        .await
}

// ============================================================
// Transfer
// ============================================================

pub async fn transfer_request(
    State(state): State<VersionState>,
    Extension(caller): Extension<PartnerIdentity>,
    body: Bytes,
) -> ProtocolResponse {
    state
        .engine
        .handle_transfer_request(state.version, &body, &caller)
        .await
}

pub async fn transfer_status(
    State(state): State<VersionState>,
    Extension(caller): Extension<PartnerIdentity>,
    Path(pid): Path<String>,
) -> ProtocolResponse {
    state
        .engine
        .handle_transfer_status(state.version, &caller, &pid)
        .await
}

pub async fn transfer_start(
    State(state): State<VersionState>,
    Extension(caller): Extension<PartnerIdentity>,
    Path(pid): Path<String>,
    body: Bytes,
) -> ProtocolResponse {
    state
        .engine
        .handle_transfer_start(state.version, &body, &caller, &pid)
        .await
}

pub async fn transfer_completion(
    State(state): State<VersionState>,
    Extension(caller): Extension<PartnerIdentity>,
    Path(pid): Path<String>,
    body: Bytes,
) -> ProtocolResponse {
    state
        .engine
        .handle_transfer_completion(state.version, &body, &caller, &pid)
        .await
}

pub async fn transfer_suspension(
    State(state): State<VersionState>,
    Extension(caller): Extension<PartnerIdentity>,
    Path(pid): Path<String>,
    body: Bytes,
) -> ProtocolResponse {
    state
        .engine
        .handle_transfer_suspension(state.version, &body, &caller, &pid)
        .await
}

pub async fn transfer_termination(
    State(state): State<VersionState>,
    Extension(caller): Extension<PartnerIdentity>,
    Path(pid): Path<String>,
    body: Bytes,
) -> ProtocolResponse {
    state
        .engine
        .handle_transfer_termination(state.version, &body, &caller, &pid)
        .await
}

pub async fn token_refresh(
    State(state): State<VersionState>,
    Extension(caller): Extension<PartnerIdentity>,
    body: Bytes,
) -> ProtocolResponse {
    state
        .engine
        .handle_token_refresh(state.version, &body, &caller)
        .await
}

// ============================================================
// Discovery
// ============================================================

#[derive(Debug, Serialize)]
pub struct VersionEntry {
    pub version: &'static str,
    pub path: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDocument {
    pub protocol_versions: Vec<VersionEntry>,
}

/// `GET /.well-known/dspace-version`
pub async fn dspace_version() -> Json<VersionDocument> {
    Json(VersionDocument {
        protocol_versions: ProtocolVersion::ALL
            .into_iter()
            .map(|v| VersionEntry {
                version: v.as_str(),
                path: v.advertised_path(),
            })
            .collect(),
    })
}
