//! Transport configuration

use std::time::Duration;

use ocpi_core::TlsMaterial;

/// Default User-Agent sent with every request
pub const DEFAULT_USER_AGENT: &str = concat!("ocpi-adapter-http/", env!("CARGO_PKG_VERSION"));

/// Configuration for [`ReqwestTransport`](crate::ReqwestTransport)
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// TCP/TLS connect budget; the per-request budget comes from the executor
    pub connect_timeout: Duration,
    pub user_agent: String,
    /// Client certificate and trust roots of the remote party
    pub tls: Option<TlsMaterial>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            tls: None,
        }
    }
}

impl TransportConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_tls(mut self, tls: TlsMaterial) -> Self {
        self.tls = Some(tls);
        self
    }
}
