//! Request observers
//!
//! The executor reports every attempt to an ordered list of observers.
//! A failing or panicking observer is reported to a [`DiagnosticSink`] and
//! never prevents the remaining observers from running.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::counters::Operation;
use crate::error::ErrorClass;
use crate::transport::HttpMethod;

pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Emitted right before an attempt is handed to the transport
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub operation: Operation,
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub request_id: String,
    pub correlation_id: String,
    /// 0 for the initial attempt
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
}

/// Emitted once an attempt has been classified
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    pub operation: Operation,
    pub request_id: String,
    pub correlation_id: String,
    pub attempt: u32,
    pub http_status: Option<u16>,
    pub status_code: Option<i64>,
    /// `None` on success
    pub error_class: Option<ErrorClass>,
    pub error: Option<String>,
    pub retryable: bool,
    pub elapsed: Duration,
}

/// Emitted once per logical call, after the retry loop
#[derive(Debug, Clone)]
pub struct OperationSummary {
    pub operation: Operation,
    pub request_id: String,
    pub correlation_id: String,
    pub attempts: u32,
    pub success: bool,
    pub error_class: Option<ErrorClass>,
    pub elapsed: Duration,
}

/// Receives request/response notifications
pub trait RequestObserver: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn on_request(&self, event: &RequestEvent) -> Result<(), ObserverError>;

    fn on_response(&self, event: &ResponseEvent) -> Result<(), ObserverError>;

    fn on_operation_complete(&self, _summary: &OperationSummary) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// Destination for observer failures
pub trait DiagnosticSink: Send + Sync {
    fn observer_failed(&self, observer: &str, hook: &'static str, error: &str);
}

/// Logs observer failures through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn observer_failed(&self, observer: &str, hook: &'static str, error: &str) {
        warn!(observer, hook, "Request observer failed: {}", error);
    }
}

/// Ordered list of observers with isolated dispatch
#[derive(Clone)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn RequestObserver>>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl Default for ObserverSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverSet {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    /// Append an observer; observers run in insertion order
    pub fn push(&mut self, observer: Arc<dyn RequestObserver>) {
        self.observers.push(observer);
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn request(&self, event: &RequestEvent) {
        self.dispatch("on_request", |observer| observer.on_request(event));
    }

    pub fn response(&self, event: &ResponseEvent) {
        self.dispatch("on_response", |observer| observer.on_response(event));
    }

    pub fn operation_complete(&self, summary: &OperationSummary) {
        self.dispatch("on_operation_complete", |observer| {
            observer.on_operation_complete(summary)
        });
    }

    fn dispatch<F>(&self, hook: &'static str, mut call: F)
    where
        F: FnMut(&dyn RequestObserver) -> Result<(), ObserverError>,
    {
        for observer in &self.observers {
            let observer = observer.as_ref();
            match panic::catch_unwind(AssertUnwindSafe(|| call(observer))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self
                    .diagnostics
                    .observer_failed(observer.name(), hook, &e.to_string()),
                Err(payload) => {
                    self.diagnostics
                        .observer_failed(observer.name(), hook, &panic_message(payload.as_ref()))
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
