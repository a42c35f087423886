//! Capability Tokens
//!
//! Short-lived HS256 tokens granting read or write access under a finalized
//! agreement, plus refresh tokens that wrap them.

pub mod claims;
pub mod service;
pub mod validator;

pub use claims::{TokenClaims, TokenError, TokenKind};
pub use service::TokenService;
pub use validator::AccessTokenValidator;
