//! Scripted transport for unit tests

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::error::TransportError;
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};

#[derive(Debug, Clone)]
pub(crate) enum MockReply {
    Response(HttpResponse),
    Fail(TransportError),
    /// Never completes; used for timeout and cancellation tests
    Hang,
}

impl MockReply {
    pub(crate) fn json(status: u16, body: Value) -> Self {
        MockReply::Response(HttpResponse::new(status, body.to_string()))
    }

    pub(crate) fn status(status: u16, body: &str) -> Self {
        MockReply::Response(HttpResponse::new(status, body))
    }
}

/// Success envelope around `data`
pub(crate) fn envelope(data: Value) -> Value {
    json!({
        "data": data,
        "status_code": 1000,
        "timestamp": "2024-05-01T12:00:00Z"
    })
}

pub(crate) fn error_envelope(status_code: i64, message: &str) -> Value {
    json!({
        "status_code": status_code,
        "status_message": message,
        "timestamp": "2024-05-01T12:00:00Z"
    })
}

/// Replies from per-route queues. The last queued reply of a route is
/// repeated once the queue would otherwise run dry.
#[derive(Default)]
pub(crate) struct MockTransport {
    routes: Mutex<HashMap<(HttpMethod, String), VecDeque<MockReply>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, method: HttpMethod, url: &str, reply: MockReply) {
        self.routes
            .lock()
            .entry((method, url.to_string()))
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub(crate) fn count(&self, method: HttpMethod, url: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && r.url == url)
            .count()
    }

    fn next_reply(&self, method: HttpMethod, url: &str) -> Option<MockReply> {
        let mut routes = self.routes.lock();
        let queue = routes.get_mut(&(method, url.to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let reply = self.next_reply(request.method, &request.url);
        self.requests.lock().push(request);

        match reply {
            Some(MockReply::Response(response)) => Ok(response),
            Some(MockReply::Fail(e)) => Err(e),
            Some(MockReply::Hang) => std::future::pending().await,
            None => Ok(HttpResponse::new(404, "no route")),
        }
    }
}
