//! # OCPI HTTP Adapter
//!
//! Production seams for `ocpi-core`:
//!
//! | Seam | Implementation |
//! |------|----------------|
//! | `HttpTransport` | [`ReqwestTransport`] (timeouts, mutual TLS) |
//! | `RequestObserver` | [`TracingObserver`] (redacted structured logs) |
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use ocpi_adapter_http::{ReqwestTransport, TracingObserver, TransportConfig};
//! use ocpi_core::{ClientConfig, InMemoryRegistry, OcpiClient, PartyIdentity, RemotePartyRecord, Role};
//!
//! fn build() -> Result<OcpiClient, Box<dyn std::error::Error>> {
//!     let transport = ReqwestTransport::new(TransportConfig::default())?;
//!
//!     let client = OcpiClient::builder()
//!         .config(ClientConfig::new("https://emsp.example.com/ocpi/versions"))
//!         .party(
//!             PartyIdentity::new("DE", "EXP", Role::Cpo),
//!             RemotePartyRecord::invited("https://cpo.example.com/ocpi/versions", "token-a"),
//!         )
//!         .transport(Arc::new(transport))
//!         .registry(Arc::new(InMemoryRegistry::new()))
//!         .observer(Arc::new(TracingObserver::new()))
//!         .build()?;
//!
//!     Ok(client)
//! }
//! ```

pub mod config;
pub mod error;
pub mod observer;
pub mod transport;

pub use config::{TransportConfig, DEFAULT_USER_AGENT};
pub use error::AdapterError;
pub use observer::{redact_headers, TracingObserver};
pub use transport::ReqwestTransport;
