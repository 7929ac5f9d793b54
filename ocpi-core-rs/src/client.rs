//! OCPI Common module client
//!
//! One [`OcpiClient`] talks to one remote party. It is a cheap, cloneable
//! handle; clones share caches, tokens and counters, so many operations can
//! be in flight at once.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ClientConfig;
use crate::counters::{CounterSet, CounterSnapshot, Operation};
use crate::error::{ClientError, OcpiError};
use crate::executor::{RequestExecutor, RequestOutcome};
use crate::observer::{DiagnosticSink, ObserverSet, RequestObserver};
use crate::registration::{RegisterRequest, RegistrationOutcome, RegistrationProtocol};
use crate::registry::{PartyKey, PartyRegistry, RemotePartyRecord};
use crate::resolver::ModuleResolver;
use crate::session::PeerSession;
use crate::transport::HttpTransport;
use crate::types::{
    Credentials, Endpoint, InterfaceRole, ModuleId, VersionDetails, VersionEntry, VersionNumber,
};

/// Client for the Common module of one remote party
#[derive(Clone)]
pub struct OcpiClient {
    party: PartyKey,
    session: Arc<PeerSession>,
    resolver: Arc<ModuleResolver>,
    registration: Arc<RegistrationProtocol>,
    counters: Arc<CounterSet>,
}

impl OcpiClient {
    pub fn builder() -> OcpiClientBuilder {
        OcpiClientBuilder::new()
    }

    /// Create a client from a registry record read by the caller
    pub fn new(
        config: ClientConfig,
        party: PartyKey,
        record: RemotePartyRecord,
        transport: Arc<dyn HttpTransport>,
        registry: Arc<dyn PartyRegistry>,
    ) -> Result<Self, ClientError> {
        Self::builder()
            .config(config)
            .party(party, record)
            .transport(transport)
            .registry(registry)
            .build()
    }

    pub fn party(&self) -> &PartyKey {
        &self.party
    }

    /// Token currently authenticating outbound calls
    pub fn access_token(&self) -> String {
        self.session.token()
    }

    /// Token the remote party currently uses to call us
    pub fn local_token(&self) -> Option<String> {
        self.registration.local_token()
    }

    // ------------------------------------------------------------------
    // Versions and endpoints
    // ------------------------------------------------------------------

    pub async fn discover_versions(
        &self,
        cancel: &CancellationToken,
    ) -> RequestOutcome<Vec<VersionEntry>> {
        self.resolver.discover_versions(cancel).await
    }

    pub async fn fetch_version_details(
        &self,
        version: Option<VersionNumber>,
        select: bool,
        cancel: &CancellationToken,
    ) -> RequestOutcome<VersionDetails> {
        self.resolver.fetch_version_details(version, select, cancel).await
    }

    /// URL of `module` in `role`; `Ok(None)` if the remote does not offer it
    pub async fn resolve_module_url(
        &self,
        module: &ModuleId,
        role: InterfaceRole,
        version: Option<VersionNumber>,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, OcpiError> {
        self.resolver
            .resolve_module_url(module, role, version, cancel)
            .await
    }

    /// Cached version catalog
    pub fn versions(&self) -> Vec<VersionEntry> {
        self.resolver.catalog().snapshot().into_values().collect()
    }

    /// Cached endpoints of `version`
    pub fn endpoints(&self, version: &VersionNumber) -> Option<Vec<Endpoint>> {
        self.resolver.table().get(version)
    }

    pub fn selected_version(&self) -> Option<VersionNumber> {
        self.resolver.selected_version()
    }

    pub fn select_version(&self, version: impl Into<VersionNumber>) {
        self.resolver.select_version(version.into());
    }

    pub fn clear_selected_version(&self) {
        self.resolver.clear_selected_version();
    }

    // ------------------------------------------------------------------
    // Credentials
    // ------------------------------------------------------------------

    pub async fn get_credentials(&self, cancel: &CancellationToken) -> RegistrationOutcome {
        self.registration.get_credentials(cancel).await
    }

    pub async fn post_credentials(
        &self,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> RegistrationOutcome {
        self.registration.post_credentials(credentials, cancel).await
    }

    pub async fn put_credentials(
        &self,
        new_local_token: Option<String>,
        cancel: &CancellationToken,
    ) -> RegistrationOutcome {
        self.registration.put_credentials(new_local_token, cancel).await
    }

    pub async fn delete_credentials(&self, cancel: &CancellationToken) -> RequestOutcome<()> {
        self.registration.delete_credentials(cancel).await
    }

    pub async fn register(
        &self,
        request: RegisterRequest,
        cancel: &CancellationToken,
    ) -> RegistrationOutcome {
        self.registration.register(request, cancel).await
    }

    // ------------------------------------------------------------------
    // Counters
    // ------------------------------------------------------------------

    pub fn counters(&self) -> BTreeMap<Operation, CounterSnapshot> {
        self.counters.snapshot()
    }
}

/// Builder for [`OcpiClient`]
pub struct OcpiClientBuilder {
    config: ClientConfig,
    party: Option<(PartyKey, Option<RemotePartyRecord>)>,
    transport: Option<Arc<dyn HttpTransport>>,
    registry: Option<Arc<dyn PartyRegistry>>,
    observers: ObserverSet,
}

impl OcpiClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            party: None,
            transport: None,
            registry: None,
            observers: ObserverSet::new(),
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Remote party and its registry record
    pub fn party(mut self, key: PartyKey, record: RemotePartyRecord) -> Self {
        self.party = Some((key, Some(record)));
        self
    }

    /// Remote party whose record is read from the registry on build
    pub fn party_key(mut self, key: PartyKey) -> Self {
        self.party = Some((key, None));
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn PartyRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Append an observer; observers are notified in insertion order
    pub fn observer(mut self, observer: Arc<dyn RequestObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.observers = self.observers.with_diagnostics(diagnostics);
        self
    }

    /// Build from the record given to [`party`](Self::party)
    pub fn build(self) -> Result<OcpiClient, ClientError> {
        let (key, record) = self.party.clone().ok_or(ClientError::Incomplete("party"))?;
        let record = record.ok_or(ClientError::Incomplete("party record"))?;
        self.assemble(key, record)
    }

    /// Build, reading the record from the registry if none was given
    pub async fn build_from_registry(self) -> Result<OcpiClient, ClientError> {
        let (key, record) = self.party.clone().ok_or(ClientError::Incomplete("party"))?;
        let record = match record {
            Some(record) => record,
            None => {
                let registry = self.registry.as_ref().ok_or(ClientError::Incomplete("registry"))?;
                registry
                    .get(&key)
                    .await?
                    .ok_or_else(|| crate::error::RegistryError::NotFound(key.to_string()))?
            }
        };
        self.assemble(key, record)
    }

    fn assemble(self, key: PartyKey, record: RemotePartyRecord) -> Result<OcpiClient, ClientError> {
        let transport = self.transport.ok_or(ClientError::Incomplete("transport"))?;
        let registry = self.registry.ok_or(ClientError::Incomplete("registry"))?;

        if record.versions_url.trim().is_empty() {
            return Err(ClientError::MissingVersionsUrl(key.to_string()));
        }
        let token = record
            .access_token()
            .ok_or_else(|| ClientError::MissingAccessToken(key.to_string()))?
            .to_string();

        let counters = Arc::new(CounterSet::new());
        let executor = Arc::new(RequestExecutor::new(
            &self.config,
            transport,
            self.observers,
            counters.clone(),
        ));
        let session = Arc::new(PeerSession::new(record.versions_url.clone(), token));
        let resolver = Arc::new(ModuleResolver::new(
            executor.clone(),
            session.clone(),
            self.config.pinned_version.clone(),
        ));
        let registration = Arc::new(RegistrationProtocol::new(
            resolver.clone(),
            executor,
            session.clone(),
            registry,
            key.clone(),
            self.config.local.clone(),
            record.roles.clone(),
            record.local_token.clone(),
        ));

        info!(party = %key, status = ?record.status, "OCPI client created");

        Ok(OcpiClient {
            party: key,
            session,
            resolver,
            registration,
            counters,
        })
    }
}

impl Default for OcpiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
