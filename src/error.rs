//! Error Types
//!
//! Layered errors: the store and the state machines report `StoreError` and
//! `StateError`; the protocol handlers convert everything into
//! `ProtocolError`, which carries the HTTP status and error code the
//! binding layer renders.

use thiserror::Error;

/// Record store failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Another writer saved the record since it was loaded.
    #[error("Concurrent modification of record {id}")]
    Conflict { id: String },

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// State machine failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StateError {
    pub fn invalid(from: impl ToString, to: impl ToString) -> Self {
        StateError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Protocol-boundary error taxonomy.
///
/// Every failure inside a handler ends up here; nothing unwinds past the
/// handler as anything else.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unknown record: {0}")]
    UnknownRecord(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Identity mismatch: {0}")]
    IdentityMismatch(String),

    /// Business validation failed (offer mismatch, agreement not finalized, ...)
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Unexpected(String),
}

impl ProtocolError {
    /// Error code for response bodies and logs
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::MalformedMessage(_) => "MALFORMED_MESSAGE",
            ProtocolError::UnknownRecord(_) => "UNKNOWN_RECORD",
            ProtocolError::InvalidTransition(_) => "INVALID_STATE_TRANSITION",
            ProtocolError::IdentityMismatch(_) => "IDENTITY_MISMATCH",
            ProtocolError::Rejected(_) => "REJECTED",
            ProtocolError::Unauthorized(_) => "UNAUTHORIZED",
            ProtocolError::NotFound(_) => "NOT_FOUND",
            ProtocolError::Unexpected(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status code
    pub fn http_status(&self) -> u16 {
        match self {
            ProtocolError::MalformedMessage(_)
            | ProtocolError::UnknownRecord(_)
            | ProtocolError::InvalidTransition(_)
            | ProtocolError::IdentityMismatch(_)
            | ProtocolError::Rejected(_) => 400,
            ProtocolError::Unauthorized(_) => 401,
            ProtocolError::NotFound(_) => 404,
            ProtocolError::Unexpected(_) => 500,
        }
    }

    /// Whether the affected record must be forced into TERMINATED.
    pub fn terminates_record(&self) -> bool {
        matches!(
            self,
            ProtocolError::IdentityMismatch(_)
                | ProtocolError::InvalidTransition(_)
                | ProtocolError::Rejected(_)
        )
    }
}

impl From<StateError> for ProtocolError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::NotFound(id) => ProtocolError::UnknownRecord(id),
            StateError::InvalidTransition { from, to } => {
                ProtocolError::InvalidTransition(format!("{} -> {}", from, to))
            }
            StateError::Store(StoreError::Conflict { id }) => {
                ProtocolError::InvalidTransition(format!("concurrent transition on {}", id))
            }
            StateError::Store(StoreError::Backend(msg)) => ProtocolError::Unexpected(msg),
        }
    }
}

impl From<StoreError> for ProtocolError {
    fn from(e: StoreError) -> Self {
        StateError::from(e).into()
    }
}

/// Outbound callback failures. Logged by the worker, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Partner responded with status {0}")]
    PartnerStatus(u16),

    #[error("No credential for partner {0}")]
    Credential(String),

    /// The record moved on before the task ran
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error(transparent)]
    State(#[from] StateError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status() {
        assert_eq!(ProtocolError::MalformedMessage("x".into()).http_status(), 400);
        assert_eq!(ProtocolError::IdentityMismatch("x".into()).http_status(), 400);
        assert_eq!(ProtocolError::Unauthorized("x".into()).http_status(), 401);
        assert_eq!(ProtocolError::NotFound("x".into()).http_status(), 404);
        assert_eq!(ProtocolError::Unexpected("x".into()).http_status(), 500);
    }

    #[test]
    fn test_state_error_conversion() {
        let e: ProtocolError = StateError::invalid("FINALIZED", "TERMINATED").into();
        assert_eq!(e.code(), "INVALID_STATE_TRANSITION");
        assert_eq!(e.to_string(), "Invalid state transition: FINALIZED -> TERMINATED");

        let e: ProtocolError = StateError::NotFound("abc".into()).into();
        assert_eq!(e, ProtocolError::UnknownRecord("abc".into()));

        let e: ProtocolError = StoreError::Conflict { id: "abc".into() }.into();
        assert_eq!(e.http_status(), 400);

        let e: ProtocolError = StoreError::Backend("disk".into()).into();
        assert_eq!(e.http_status(), 500);
    }

    #[test]
    fn test_terminates_record() {
        assert!(ProtocolError::IdentityMismatch("x".into()).terminates_record());
        assert!(!ProtocolError::MalformedMessage("x".into()).terminates_record());
        assert!(!ProtocolError::Unexpected("x".into()).terminates_record());
    }
}
