//! Config-backed partner identity and credentials.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use super::{IdentityValidator, PartnerIdentity, PartnerTokenProvider};
use crate::config::PartnerConfig;

/// Maps configured inbound bearer tokens to partners.
pub struct StaticIdentityValidator {
    by_token: HashMap<String, PartnerIdentity>,
}

impl StaticIdentityValidator {
    pub fn new(partners: &[PartnerConfig]) -> Self {
        let by_token = partners
            .iter()
            .map(|p| {
                (
                    p.inbound_token.clone(),
                    PartnerIdentity {
                        partner_id: p.partner_id.clone(),
                        credentials: p.credentials.clone(),
                    },
                )
            })
            .collect();
        Self { by_token }
    }
}

/// Token part of an `Authorization` header; the `Bearer` scheme is optional.
fn bearer(header: &str) -> &str {
    let header = header.trim();
    match header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        _ => header,
    }
}

#[async_trait]
impl IdentityValidator for StaticIdentityValidator {
    async fn resolve(&self, authorization: Option<&str>) -> Option<PartnerIdentity> {
        let token = bearer(authorization?);
        let identity = self.by_token.get(token).cloned();
        if identity.is_none() {
            debug!("Unknown partner credential");
        }
        identity
    }
}

/// Outbound bearer tokens per partner.
pub struct StaticPartnerTokenProvider {
    tokens: HashMap<String, String>,
}

impl StaticPartnerTokenProvider {
    pub fn new(partners: &[PartnerConfig]) -> Self {
        let tokens = partners
            .iter()
            .filter_map(|p| Some((p.partner_id.clone(), p.outbound_token.clone()?)))
            .collect();
        Self { tokens }
    }
}

#[async_trait]
impl PartnerTokenProvider for StaticPartnerTokenProvider {
    async fn provide_token_for_partner(&self, partner_id: &str) -> Option<String> {
        self.tokens.get(partner_id).cloned()
    }
}
