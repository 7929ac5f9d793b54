//! Error taxonomy
//!
//! Every failure an operation can run into is returned as a value inside a
//! [`RequestOutcome`](crate::executor::RequestOutcome); only construction
//! misuse surfaces as [`ClientError`].

use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorClass {
    /// No version or endpoint could be resolved. Never retried.
    Configuration,
    /// Transport succeeded but the OCPI status or payload was unusable
    Protocol,
    /// Network, timeout, cancellation or server-side transport failure
    TransientTransport,
    /// Remote data inconsistent with what is already known about the party
    Validation,
}

/// Faults raised by the HTTP transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout | TransportError::Connect(_) | TransportError::Io(_)
        )
    }
}

/// Errors carried by a failed operation outcome
#[derive(Debug, Error)]
pub enum OcpiError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("OCPI status {status_code}: {message}")]
    Protocol { status_code: i64, message: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("HTTP status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("validation error: {0}")]
    Validation(String),
}

impl OcpiError {
    pub fn class(&self) -> ErrorClass {
        match self {
            OcpiError::Configuration(_) => ErrorClass::Configuration,
            OcpiError::Protocol { .. } | OcpiError::Decode(_) => ErrorClass::Protocol,
            OcpiError::HttpStatus { status, .. } if *status >= 500 => ErrorClass::TransientTransport,
            OcpiError::HttpStatus { .. } => ErrorClass::Protocol,
            OcpiError::Transport(_) => ErrorClass::TransientTransport,
            OcpiError::Validation(_) => ErrorClass::Validation,
        }
    }

    /// OCPI `status_code`, when the remote produced one
    pub fn status_code(&self) -> Option<i64> {
        match self {
            OcpiError::Protocol { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

/// Errors from the party registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("party not found: {0}")]
    NotFound(String),

    #[error("update condition failed: {0}")]
    ConditionFailed(String),

    #[error("registry backend error: {0}")]
    Backend(String),
}

/// Misuse detected while constructing a client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("party {0} has no access token or invitation token configured")]
    MissingAccessToken(String),

    #[error("party {0} has no versions URL configured")]
    MissingVersionsUrl(String),

    #[error("client builder is missing {0}")]
    Incomplete(&'static str),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}
