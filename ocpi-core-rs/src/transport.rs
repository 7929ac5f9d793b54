//! HTTP transport seam
//!
//! The client never talks to the network itself: connection pooling, TLS and
//! DNS live behind [`HttpTransport`]. `ocpi-adapter-http` ships a reqwest
//! implementation.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::TransportError;

/// Unique id of one logical call, constant across retries
pub const HEADER_REQUEST_ID: &str = "X-Request-ID";
/// Correlation id of one logical call, constant across retries
pub const HEADER_CORRELATION_ID: &str = "X-Correlation-ID";
/// Attempt counter, `0` for the initial attempt
pub const HEADER_RETRY_COUNT: &str = "X-Retry-Count";
pub const HEADER_AUTHORIZATION: &str = "Authorization";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";

/// HTTP methods used by the Common module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound request, as handed to the transport
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Budget of this attempt
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }

    /// Append a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set a JSON body
    pub fn with_json_body(mut self, body: Vec<u8>) -> Self {
        self.headers
            .push((HEADER_CONTENT_TYPE.to_string(), "application/json".to_string()));
        self.body = Some(body);
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response from the transport
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Server-side failure class. Client errors (4xx) are never retried.
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500
}

/// Sends a single HTTP request
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_ignores_case() {
        let request = HttpRequest::new(HttpMethod::Get, "https://example.com", Duration::from_secs(1))
            .with_header("X-Request-ID", "abc");

        assert_eq!(request.header("x-request-id"), Some("abc"));
        assert_eq!(request.header("X-Correlation-ID"), None);
    }

    #[test]
    fn test_retryable_status() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }
}
