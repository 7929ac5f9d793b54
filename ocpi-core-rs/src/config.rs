//! Client configuration
//!
//! Retry, timeout and authentication settings plus the identity this side
//! advertises to remote parties.

use std::time::Duration;

use crate::types::{CredentialsRole, VersionNumber};

/// Complete client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// What we advertise in outbound credentials
    pub local: LocalPartyConfig,

    /// Retry behaviour of every outbound call
    pub retry: RetryPolicy,

    /// Budget of a single attempt
    pub request_timeout: Duration,

    /// Optional budget of a whole operation, retries included
    pub operation_deadline: Option<Duration>,

    /// Send `Authorization: Token <base64(token)>` (OCPI 2.2+) instead of the raw token
    pub encode_token_base64: bool,

    /// Version used whenever a call does not name one explicitly
    pub pinned_version: Option<VersionNumber>,
}

/// Identity of the local platform
#[derive(Debug, Clone, Default)]
pub struct LocalPartyConfig {
    /// Our own versions endpoint
    pub versions_url: String,

    /// Roles we operate under
    pub roles: Vec<CredentialsRole>,
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the initial one
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_backoff: Duration,

    /// Backoff cap
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Retries without any delay in between
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            local: LocalPartyConfig::default(),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
            operation_deadline: None,
            encode_token_base64: true,
            pinned_version: None,
        }
    }
}

impl ClientConfig {
    /// Create config advertising the given versions URL
    pub fn new(versions_url: impl Into<String>) -> Self {
        Self {
            local: LocalPartyConfig {
                versions_url: versions_url.into(),
                roles: Vec::new(),
            },
            ..Default::default()
        }
    }

    /// Add a role we operate under
    pub fn with_role(mut self, role: CredentialsRole) -> Self {
        self.local.roles.push(role);
        self
    }

    /// Set retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set per-attempt timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Bound the total duration of each operation
    pub fn with_operation_deadline(mut self, deadline: Duration) -> Self {
        self.operation_deadline = Some(deadline);
        self
    }

    /// Send tokens unencoded, as OCPI 2.1.1 peers expect
    pub fn with_raw_tokens(mut self) -> Self {
        self.encode_token_base64 = false;
        self
    }

    /// Pin the protocol version
    pub fn with_pinned_version(mut self, version: impl Into<VersionNumber>) -> Self {
        self.pinned_version = Some(version.into());
        self
    }
}
