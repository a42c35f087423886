//! Downstream token checks
//!
//! A valid signature is not enough: an access token is honoured only while
//! its agreement is FINALIZED and only for the address it names.

use std::sync::Arc;
use tracing::{debug, warn};

use super::claims::{TokenClaims, TokenKind};
use super::service::TokenService;
use crate::core_types::parse_pid;
use crate::negotiation::{NegotiationMachine, NegotiationState};

pub struct AccessTokenValidator {
    tokens: Arc<TokenService>,
    negotiations: Arc<NegotiationMachine>,
}

impl AccessTokenValidator {
    pub fn new(tokens: Arc<TokenService>, negotiations: Arc<NegotiationMachine>) -> Self {
        Self {
            tokens,
            negotiations,
        }
    }

    async fn agreement_finalized(&self, claims: &TokenClaims) -> bool {
        let Some(contract_id) = claims.contract_id.as_deref().and_then(parse_pid) else {
            return false;
        };
        match self.negotiations.find_by_contract_id(contract_id).await {
            Ok(Some(record)) => record.state == NegotiationState::Finalized,
            Ok(None) => false,
            Err(e) => {
                warn!(contract_id = %contract_id, error = %e, "Agreement lookup failed");
                false
            }
        }
    }

    fn claims_of(&self, token: &str, kind: TokenKind) -> Option<TokenClaims> {
        let claims = self.tokens.validated_claims(token)?;
        (self.tokens.kind_of(&claims) == Some(kind)).then_some(claims)
    }

    /// Read access to `data_address`.
    pub async fn validate_access(&self, token: &str, data_address: &str) -> bool {
        let Some(claims) = self.claims_of(token, TokenKind::DataAccess) else {
            return false;
        };
        if claims.data_address.as_deref() != Some(data_address) {
            debug!(expected = ?claims.data_address, actual = %data_address, "Token bound to another address");
            return false;
        }
        self.agreement_finalized(&claims).await
    }

    /// Write access to `asset_id`.
    pub async fn validate_write(&self, token: &str, asset_id: &str) -> bool {
        let Some(claims) = self.claims_of(token, TokenKind::WriteAccess) else {
            return false;
        };
        if claims.asset_id.as_deref() != Some(asset_id) {
            debug!(expected = ?claims.asset_id, actual = %asset_id, "Token bound to another asset");
            return false;
        }
        self.agreement_finalized(&claims).await
    }

    /// Check a refresh token presented by `partner_id`.
    ///
    /// Returns the claims of the wrapped access token, which must carry one
    /// of this provider's access issuers.
    pub fn validate_refresh(&self, token: &str, partner_id: &str) -> Option<TokenClaims> {
        let claims = self.claims_of(token, TokenKind::Refresh)?;
        if claims.sub.as_deref() != Some(partner_id) {
            debug!(subject = ?claims.sub, caller = %partner_id, "Refresh token subject mismatch");
            return None;
        }
        let wrapped = self.tokens.extract_claims(claims.wrapped_token.as_deref()?).ok()?;
        match self.tokens.kind_of(&wrapped) {
            Some(kind) if kind.is_access() => Some(wrapped),
            _ => {
                debug!(issuer = %wrapped.iss, "Wrapped token has a foreign issuer");
                None
            }
        }
    }
}
