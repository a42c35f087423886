//! Token Service
//!
//! HS256 capability tokens with a rotating key ring. One signing key is
//! active; the verifier of the key it replaced stays valid until the next
//! rotation. Issuance and validation hold the read lock, rotation holds the
//! write lock. Rotation is lazy: every issuance checks whether the interval
//! has elapsed.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode};
use rand::RngCore;
use rand::rngs::OsRng;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};
use uuid::Uuid;

use super::claims::{TokenClaims, TokenError, TokenKind};
use crate::config::TokenConfig;

struct SigningKey {
    kid: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    fn generate() -> Self {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        Self {
            kid: Uuid::new_v4().simple().to_string(),
            encoding: EncodingKey::from_secret(&secret),
            decoding: DecodingKey::from_secret(&secret),
        }
    }
}

struct KeyRing {
    current: SigningKey,
    /// (kid, verifier) of the key replaced by the last rotation
    previous: Option<(String, DecodingKey)>,
    rotated_at: DateTime<Utc>,
}

impl KeyRing {
    fn new() -> Self {
        Self {
            current: SigningKey::generate(),
            previous: None,
            rotated_at: Utc::now(),
        }
    }

    fn rotate(&mut self) {
        let retired = std::mem::replace(&mut self.current, SigningKey::generate());
        self.previous = Some((retired.kid, retired.decoding));
        self.rotated_at = Utc::now();
    }

    /// Verifiers to try for a token carrying `kid`.
    fn verifiers(&self, kid: Option<&str>) -> Vec<&DecodingKey> {
        let previous = self.previous.as_ref();
        match kid {
            Some(kid) if kid == self.current.kid => vec![&self.current.decoding],
            Some(kid) => previous
                .filter(|(prev_kid, _)| prev_kid == kid)
                .map(|(_, key)| vec![key])
                .unwrap_or_default(),
            None => std::iter::once(&self.current.decoding)
                .chain(previous.map(|(_, key)| key))
                .collect(),
        }
    }
}

pub struct TokenService {
    config: TokenConfig,
    keys: RwLock<KeyRing>,
}

impl TokenService {
    pub fn new(config: TokenConfig) -> Self {
        Self {
            config,
            keys: RwLock::new(KeyRing::new()),
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn issuer(&self, kind: TokenKind) -> String {
        kind.issuer(&self.config.issuer)
    }

    /// Resolve the kind of a token from its issuer claim.
    pub fn kind_of(&self, claims: &TokenClaims) -> Option<TokenKind> {
        TokenKind::from_issuer(&self.config.issuer, &claims.iss)
    }

    // Poisoning only means another thread panicked mid-operation; the ring
    // itself is always left consistent, so recover the guard.
    fn read_keys(&self) -> RwLockReadGuard<'_, KeyRing> {
        self.keys.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_keys(&self) -> RwLockWriteGuard<'_, KeyRing> {
        self.keys.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Rotate immediately.
    pub fn rotate(&self) {
        let mut ring = self.write_keys();
        ring.rotate();
        info!(kid = %ring.current.kid, "Token signing key rotated");
    }

    /// Rotate if the interval has elapsed since the last rotation.
    pub fn rotate_if_due(&self) -> bool {
        let interval = self.config.rotation_interval();
        let due = Utc::now() - self.read_keys().rotated_at >= interval;
        if !due {
            return false;
        }
        let mut ring = self.write_keys();
        // Another issuer may have rotated between the two locks
        if Utc::now() - ring.rotated_at < interval {
            return false;
        }
        ring.rotate();
        info!(kid = %ring.current.kid, "Token signing key rotated (interval elapsed)");
        true
    }

    fn base_claims(&self, kind: TokenKind, validity: chrono::Duration) -> TokenClaims {
        let now = Utc::now();
        TokenClaims {
            iss: self.issuer(kind),
            sub: None,
            contract_id: None,
            data_address: None,
            asset_id: None,
            wrapped_token: None,
            iat: now.timestamp(),
            exp: (now + validity).timestamp(),
        }
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        self.rotate_if_due();
        let ring = self.read_keys();
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(ring.current.kid.clone());
        encode(&header, claims, &ring.current.encoding).map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Read grant on `data_address` under `contract_id`.
    pub fn issue_data_access_token(
        &self,
        contract_id: &str,
        data_address: &str,
    ) -> Result<String, TokenError> {
        let mut claims = self.base_claims(TokenKind::DataAccess, self.config.access_validity());
        claims.contract_id = Some(contract_id.to_string());
        claims.data_address = Some(data_address.to_string());
        debug!(contract_id = %contract_id, "Issuing data access token");
        self.sign(&claims)
    }

    /// Write grant on `asset_id` under `contract_id`.
    pub fn issue_write_access_token(
        &self,
        contract_id: &str,
        asset_id: &str,
    ) -> Result<String, TokenError> {
        let mut claims = self.base_claims(TokenKind::WriteAccess, self.config.access_validity());
        claims.contract_id = Some(contract_id.to_string());
        claims.asset_id = Some(asset_id.to_string());
        debug!(contract_id = %contract_id, "Issuing write access token");
        self.sign(&claims)
    }

    /// Refresh token bound to `partner_id`, wrapping `access_token`.
    pub fn issue_refresh_token(
        &self,
        access_token: &str,
        partner_id: &str,
    ) -> Result<String, TokenError> {
        let mut claims = self.base_claims(TokenKind::Refresh, self.config.refresh_validity());
        claims.sub = Some(partner_id.to_string());
        claims.wrapped_token = Some(access_token.to_string());
        self.sign(&claims)
    }

    fn verify(&self, token: &str, check_expiry: bool) -> Result<TokenClaims, TokenError> {
        let header = decode_header(token).map_err(|e| TokenError::Malformed(e.to_string()))?;
        if header.alg != Algorithm::HS256 {
            return Err(TokenError::Malformed(format!("unexpected algorithm {:?}", header.alg)));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.config.leeway_secs;
        validation.validate_aud = false;
        validation.validate_exp = check_expiry;
        if !check_expiry {
            validation.required_spec_claims.clear();
        }

        let ring = self.read_keys();
        let verifiers = ring.verifiers(header.kid.as_deref());
        if verifiers.is_empty() {
            return Err(TokenError::Malformed("unknown signing key".into()));
        }

        let mut last_error = None;
        for key in verifiers {
            match decode::<TokenClaims>(token, key, &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) => last_error = Some(e),
            }
        }
        Err(TokenError::Malformed(
            last_error.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    /// Signature (current or previous key) and expiry check. Never errors.
    pub fn validate(&self, token: &str) -> bool {
        self.validated_claims(token).is_some()
    }

    /// Claims of a token that passes [`TokenService::validate`].
    pub fn validated_claims(&self, token: &str) -> Option<TokenClaims> {
        match self.verify(token, true) {
            Ok(claims) => Some(claims),
            Err(e) => {
                debug!(error = %e, "Token validation failed");
                None
            }
        }
    }

    /// Verified claims without the expiry check.
    pub fn extract_claims(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify(token, false)
    }
}
