//! Request executor
//!
//! Runs one logical OCPI call: builds and sends each attempt, classifies the
//! response, retries transient failures up to a cap and reports the result to
//! the counters and observers. Faults are never raised; every call ends in a
//! [`RequestOutcome`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{ClientConfig, RetryPolicy};
use crate::counters::{CounterSet, Operation};
use crate::error::{ErrorClass, OcpiError, TransportError};
use crate::observer::{ObserverSet, OperationSummary, RequestEvent, ResponseEvent};
use crate::transport::{
    is_retryable_status, HttpMethod, HttpRequest, HttpResponse, HttpTransport,
    HEADER_AUTHORIZATION, HEADER_CORRELATION_ID, HEADER_REQUEST_ID, HEADER_RETRY_COUNT,
};
use crate::types::{OcpiResponse, STATUS_SUCCESS};

/// Longest body excerpt kept in error messages
const BODY_EXCERPT_LEN: usize = 256;

/// Result of one logical call, after retries
#[derive(Debug)]
pub struct RequestOutcome<T> {
    pub result: Result<OcpiResponse<T>, OcpiError>,
    /// HTTP status of the last attempt, if one was received
    pub http_status: Option<u16>,
    /// Whether the last attempt was eligible for retry
    pub retryable: bool,
    /// Attempts actually sent
    pub attempts: u32,
    pub request_id: String,
    pub correlation_id: String,
}

impl<T> RequestOutcome<T> {
    /// Outcome of a call that failed before anything was sent
    pub fn local_failure(error: OcpiError) -> Self {
        Self {
            result: Err(error),
            http_status: None,
            retryable: false,
            attempts: 0,
            request_id: Uuid::new_v4().to_string(),
            correlation_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Payload of a successful call
    pub fn data(&self) -> Option<&T> {
        self.result.as_ref().ok().and_then(|r| r.data.as_ref())
    }

    pub fn error(&self) -> Option<&OcpiError> {
        self.result.as_ref().err()
    }

    pub fn error_class(&self) -> Option<ErrorClass> {
        self.error().map(OcpiError::class)
    }

    pub fn into_result(self) -> Result<OcpiResponse<T>, OcpiError> {
        self.result
    }

    /// Transform the payload, keeping the call metadata
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RequestOutcome<U> {
        RequestOutcome {
            result: self.result.map(|r| r.map(f)),
            http_status: self.http_status,
            retryable: self.retryable,
            attempts: self.attempts,
            request_id: self.request_id,
            correlation_id: self.correlation_id,
        }
    }

    /// Replace a successful result with an error, e.g. after payload checks
    pub(crate) fn fail_with(mut self, error: OcpiError) -> Self {
        self.result = Err(error);
        self.retryable = false;
        self
    }
}

/// Per-attempt context handed to the request builder
#[derive(Debug, Clone)]
pub struct Attempt<'a> {
    pub request_id: &'a str,
    pub correlation_id: &'a str,
    /// 0 for the initial attempt
    pub number: u32,
    pub timeout: Duration,
}

/// Description of an authenticated OCPI call
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub operation: Operation,
    pub method: HttpMethod,
    pub url: String,
    pub token: String,
    pub body: Option<Vec<u8>>,
}

impl RequestSpec {
    pub fn new(
        operation: Operation,
        method: HttpMethod,
        url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            method,
            url: url.into(),
            token: token.into(),
            body: None,
        }
    }

    /// Attach a JSON body
    pub fn with_json(mut self, body: &impl Serialize) -> Result<Self, OcpiError> {
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self)
    }
}

/// Format an `Authorization` header value
pub fn authorization_header(token: &str, encode_base64: bool) -> String {
    if encode_base64 {
        format!("Token {}", BASE64.encode(token))
    } else {
        format!("Token {}", token)
    }
}

/// Outcome of a single attempt
struct AttemptResult<T> {
    result: Result<OcpiResponse<T>, OcpiError>,
    http_status: Option<u16>,
    retryable: bool,
}

/// Generic retrying invoker for outbound calls
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    observers: ObserverSet,
    counters: Arc<CounterSet>,
    retry: RetryPolicy,
    request_timeout: Duration,
    operation_deadline: Option<Duration>,
    encode_token_base64: bool,
}

impl RequestExecutor {
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn HttpTransport>,
        observers: ObserverSet,
        counters: Arc<CounterSet>,
    ) -> Self {
        Self {
            transport,
            observers,
            counters,
            retry: config.retry,
            request_timeout: config.request_timeout,
            operation_deadline: config.operation_deadline,
            encode_token_base64: config.encode_token_base64,
        }
    }

    pub fn counters(&self) -> &Arc<CounterSet> {
        &self.counters
    }

    /// Execute an authenticated call with the configured retry policy
    pub async fn send<T>(&self, spec: &RequestSpec, cancel: &CancellationToken) -> RequestOutcome<T>
    where
        T: DeserializeOwned,
    {
        let authorization = authorization_header(&spec.token, self.encode_token_base64);
        self.execute(spec.operation, self.retry.max_retries, cancel, |attempt| {
            let request = HttpRequest::new(spec.method, spec.url.clone(), attempt.timeout)
                .with_header(HEADER_AUTHORIZATION, authorization.clone());
            match &spec.body {
                Some(body) => request.with_json_body(body.clone()),
                None => request,
            }
        })
        .await
    }

    /// Run the initial attempt plus up to `max_retries` retries, sequentially.
    ///
    /// `build` is called once per attempt. The correlation headers and the
    /// retry counter are added here, so builders only describe the call.
    pub async fn execute<T, B>(
        &self,
        operation: Operation,
        max_retries: u32,
        cancel: &CancellationToken,
        build: B,
    ) -> RequestOutcome<T>
    where
        T: DeserializeOwned,
        B: Fn(&Attempt<'_>) -> HttpRequest,
    {
        let request_id = Uuid::new_v4().to_string();
        let correlation_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let deadline = self.operation_deadline.map(|d| started + d);

        let mut attempts = 0u32;
        let last = loop {
            let timeout = match deadline {
                Some(deadline) => deadline
                    .saturating_duration_since(Instant::now())
                    .min(self.request_timeout),
                None => self.request_timeout,
            };
            if timeout.is_zero() {
                debug!(%operation, attempts, "Operation deadline exhausted");
                break AttemptResult {
                    result: Err(OcpiError::Transport(TransportError::Timeout)),
                    http_status: None,
                    retryable: false,
                };
            }

            let attempt = Attempt {
                request_id: &request_id,
                correlation_id: &correlation_id,
                number: attempts,
                timeout,
            };
            let request = build(&attempt)
                .with_header(HEADER_REQUEST_ID, request_id.as_str())
                .with_header(HEADER_CORRELATION_ID, correlation_id.as_str())
                .with_header(HEADER_RETRY_COUNT, attempts.to_string());

            self.observers.request(&RequestEvent {
                operation,
                method: request.method,
                url: request.url.clone(),
                headers: request.headers.clone(),
                request_id: request_id.clone(),
                correlation_id: correlation_id.clone(),
                attempt: attempts,
                started_at: Utc::now(),
            });

            let attempt_started = Instant::now();
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransportError::Cancelled),
                sent = tokio::time::timeout(timeout, self.transport.send(request)) => {
                    sent.unwrap_or(Err(TransportError::Timeout))
                }
            };
            let result = interpret::<T>(sent);

            self.observers.response(&ResponseEvent {
                operation,
                request_id: request_id.clone(),
                correlation_id: correlation_id.clone(),
                attempt: attempts,
                http_status: result.http_status,
                status_code: match &result.result {
                    Ok(response) => Some(response.status_code),
                    Err(e) => e.status_code(),
                },
                error_class: result.result.as_ref().err().map(OcpiError::class),
                error: result.result.as_ref().err().map(|e| e.to_string()),
                retryable: result.retryable,
                elapsed: attempt_started.elapsed(),
            });

            attempts += 1;
            if !result.retryable || attempts > max_retries || cancel.is_cancelled() {
                break result;
            }

            let backoff = self.retry.backoff(attempts);
            if let Some(deadline) = deadline {
                if Instant::now() + backoff >= deadline {
                    debug!(%operation, attempts, "No time left for another attempt");
                    break result;
                }
            }

            warn!(
                %operation,
                attempt = attempts,
                max_retries,
                "Retrying after transient failure: {}",
                result.result.as_ref().err().map(|e| e.to_string()).unwrap_or_default()
            );

            if !backoff.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => break result,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        };

        let success = last.result.is_ok();
        let error_class = last.result.as_ref().err().map(OcpiError::class);
        self.counters.increment(operation, success);
        self.observers.operation_complete(&OperationSummary {
            operation,
            request_id: request_id.clone(),
            correlation_id: correlation_id.clone(),
            attempts,
            success,
            error_class,
            elapsed: started.elapsed(),
        });
        debug!(%operation, attempts, success, "Operation finished");

        RequestOutcome {
            result: last.result,
            http_status: last.http_status,
            retryable: last.retryable,
            attempts,
            request_id,
            correlation_id,
        }
    }
}

fn interpret<T: DeserializeOwned>(sent: Result<HttpResponse, TransportError>) -> AttemptResult<T> {
    match sent {
        Ok(response) => AttemptResult {
            http_status: Some(response.status),
            retryable: is_retryable_status(response.status),
            result: decode_response(&response),
        },
        Err(e) => AttemptResult {
            http_status: None,
            retryable: e.is_retryable(),
            result: Err(OcpiError::Transport(e)),
        },
    }
}

/// Decode an OCPI envelope; only HTTP 2xx with `status_code == 1000` succeeds
pub(crate) fn decode_response<T: DeserializeOwned>(
    response: &HttpResponse,
) -> Result<OcpiResponse<T>, OcpiError> {
    let envelope = serde_json::from_slice::<OcpiResponse<Value>>(&response.body);

    if !response.is_success() {
        let message = match &envelope {
            Ok(env) if !is_retryable_status(response.status) && env.status_code != STATUS_SUCCESS => {
                return Err(OcpiError::Protocol {
                    status_code: env.status_code,
                    message: env.status_message.clone().unwrap_or_default(),
                });
            }
            Ok(env) => env.status_message.clone().unwrap_or_default(),
            Err(_) => body_excerpt(&response.body),
        };
        return Err(OcpiError::HttpStatus {
            status: response.status,
            message,
        });
    }

    let envelope = envelope?;
    if envelope.status_code != STATUS_SUCCESS {
        return Err(OcpiError::Protocol {
            status_code: envelope.status_code,
            message: envelope.status_message.unwrap_or_default(),
        });
    }

    let data = match envelope.data {
        Some(Value::Null) | None => None,
        Some(value) => Some(serde_json::from_value(value)?),
    };

    Ok(OcpiResponse {
        data,
        status_code: envelope.status_code,
        status_message: envelope.status_message,
        timestamp: envelope.timestamp,
    })
}

fn body_excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    text.chars().take(BODY_EXCERPT_LEN).collect()
}
