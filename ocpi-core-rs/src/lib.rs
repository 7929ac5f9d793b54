//! # OCPI Core
//!
//! Client side of the OCPI "Common" module: everything a party needs to talk
//! to a remote roaming party before any functional module is used.
//!
//! ## Architecture
//!
//! ```text
//!        OcpiClient (one per remote party)
//!   ┌──────────────────────────────────────────┐
//!   │  RegistrationProtocol                    │
//!   │   GET/POST/PUT/DELETE credentials        │
//!   │   Register ──► PartyRegistry (update)    │
//!   │        │                                 │
//!   │        ▼                                 │
//!   │  ModuleResolver                          │
//!   │   VersionCatalog │ EndpointTable         │
//!   │        │                                 │
//!   │        ▼                                 │
//!   │  RequestExecutor ──► ObserverSet         │
//!   │   retry, timeout, ──► CounterSet         │
//!   │   cancellation                           │
//!   └────────┬─────────────────────────────────┘
//!            │ HttpTransport
//!            ▼
//!      remote OCPI party
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use ocpi_core::{
//!     ClientConfig, CredentialsRole, HttpTransport, InMemoryRegistry, OcpiClient,
//!     PartyIdentity, RegisterRequest, RemotePartyRecord, Role,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! async fn register(transport: Arc<dyn HttpTransport>) -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("https://emsp.example.com/ocpi/versions")
//!         .with_role(CredentialsRole::new(Role::Emsp, "EMS", "NL", "Example eMSP"));
//!     let party = PartyIdentity::new("DE", "EXP", Role::Cpo);
//!     let record = RemotePartyRecord::invited("https://cpo.example.com/ocpi/versions", "token-a");
//!     let registry = Arc::new(InMemoryRegistry::new());
//!
//!     let client = OcpiClient::new(config, party, record, transport, registry)?;
//!     let result = client.register(RegisterRequest::default(), &CancellationToken::new()).await;
//!     println!("registered: {}", result.is_success());
//!
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod error;
pub mod config;
pub mod transport;
pub mod observer;
pub mod counters;
pub mod executor;
pub mod cache;
pub mod session;
pub mod resolver;
pub mod registry;
pub mod registration;
pub mod client;

#[cfg(test)]
mod test_support;

pub use types::*;
pub use error::{ClientError, ErrorClass, OcpiError, RegistryError, TransportError};
pub use config::{ClientConfig, LocalPartyConfig, RetryPolicy};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
pub use observer::{
    DiagnosticSink, ObserverError, ObserverSet, OperationSummary, RequestEvent, RequestObserver,
    ResponseEvent, TracingDiagnostics,
};
pub use counters::{CounterSet, CounterSnapshot, Operation};
pub use executor::{RequestExecutor, RequestOutcome, RequestSpec};
pub use cache::{EndpointTable, VersionCache, VersionCatalog};
pub use resolver::ModuleResolver;
pub use registry::{
    AccessStatus, ConnectionStatus, InMemoryRegistry, PartyKey, PartyPatch, PartyRegistry,
    PartyStatus, RemotePartyRecord, TlsMaterial, UpdateCondition,
};
pub use registration::{RegisterRequest, RegistrationOutcome, RegistrationProtocol, RegistryUpdate};
pub use client::{OcpiClient, OcpiClientBuilder};
