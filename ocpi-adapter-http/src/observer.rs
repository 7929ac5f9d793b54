//! Structured logging of OCPI traffic

use tracing::{debug, info, warn};

use ocpi_core::transport::HEADER_AUTHORIZATION;
use ocpi_core::{ObserverError, OperationSummary, RequestEvent, RequestObserver, ResponseEvent};

const REDACTED: &str = "Token ***";

/// Logs every attempt and operation through `tracing`
///
/// Credentials never reach the log: the `Authorization` header is redacted.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TracingObserver {
    pub fn new() -> Self {
        Self
    }
}

/// Copy of `headers` safe to log
pub fn redact_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            if name.eq_ignore_ascii_case(HEADER_AUTHORIZATION) {
                (name.clone(), REDACTED.to_string())
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}

impl RequestObserver for TracingObserver {
    fn name(&self) -> &str {
        "tracing"
    }

    fn on_request(&self, event: &RequestEvent) -> Result<(), ObserverError> {
        debug!(
            operation = %event.operation,
            method = %event.method,
            url = %event.url,
            request_id = %event.request_id,
            correlation_id = %event.correlation_id,
            attempt = event.attempt,
            headers = ?redact_headers(&event.headers),
            "OCPI request"
        );
        Ok(())
    }

    fn on_response(&self, event: &ResponseEvent) -> Result<(), ObserverError> {
        match &event.error {
            Some(error) => warn!(
                operation = %event.operation,
                request_id = %event.request_id,
                attempt = event.attempt,
                http_status = ?event.http_status,
                status_code = ?event.status_code,
                class = ?event.error_class,
                retryable = event.retryable,
                "OCPI request failed: {}",
                error
            ),
            None => debug!(
                operation = %event.operation,
                request_id = %event.request_id,
                attempt = event.attempt,
                http_status = ?event.http_status,
                elapsed_ms = event.elapsed.as_millis() as u64,
                "OCPI response"
            ),
        }
        Ok(())
    }

    fn on_operation_complete(&self, summary: &OperationSummary) -> Result<(), ObserverError> {
        info!(
            operation = %summary.operation,
            correlation_id = %summary.correlation_id,
            attempts = summary.attempts,
            success = summary.success,
            class = ?summary.error_class,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "OCPI operation complete"
        );
        Ok(())
    }
}
