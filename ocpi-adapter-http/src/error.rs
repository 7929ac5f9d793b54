//! Adapter errors

use thiserror::Error;

/// Errors raised while building an HTTP transport
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid TLS material: {0}")]
    InvalidTls(String),
}
