//! Capability token claims.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token family, encoded in the issuer claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Read grant on a dataset address
    DataAccess,
    /// Write grant on an asset
    WriteAccess,
    /// Wraps an access token, exchangeable for a fresh pair
    Refresh,
}

impl TokenKind {
    pub const ALL: [TokenKind; 3] = [TokenKind::DataAccess, TokenKind::WriteAccess, TokenKind::Refresh];

    fn suffix(&self) -> &'static str {
        match self {
            TokenKind::DataAccess => "data-access",
            TokenKind::WriteAccess => "write-access",
            TokenKind::Refresh => "refresh",
        }
    }

    /// Issuer claim for this kind under the provider's issuer base.
    pub fn issuer(&self, base: &str) -> String {
        format!("{}#{}", base, self.suffix())
    }

    /// Reverse of [`TokenKind::issuer`].
    pub fn from_issuer(base: &str, iss: &str) -> Option<TokenKind> {
        TokenKind::ALL.into_iter().find(|k| k.issuer(base) == iss)
    }

    #[inline]
    pub fn is_access(&self) -> bool {
        matches!(self, TokenKind::DataAccess | TokenKind::WriteAccess)
    }
}

/// Claims carried by every token this provider signs.
///
/// Fields not used by a token kind are omitted from the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapped_token: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Token signing failed: {0}")]
    Signing(String),
}
