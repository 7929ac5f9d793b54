//! Module resolution
//!
//! Maps a (module, interface role, optional version) triple to an endpoint
//! URL, filling the Version Catalog and Endpoint Table on demand.
//!
//! Concurrent resolutions that both find data missing may both trigger a
//! discovery call. Refreshes replace whole entries, so the caches always end
//! up matching the most recent successful response.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{EndpointTable, VersionCatalog};
use crate::counters::Operation;
use crate::error::{OcpiError, TransportError};
use crate::executor::{RequestExecutor, RequestOutcome, RequestSpec};
use crate::session::PeerSession;
use crate::transport::HttpMethod;
use crate::types::{InterfaceRole, ModuleId, VersionDetails, VersionEntry, VersionNumber, STATUS_SUCCESS};

pub struct ModuleResolver {
    executor: Arc<RequestExecutor>,
    session: Arc<PeerSession>,
    catalog: VersionCatalog,
    table: EndpointTable,
    pinned_version: Option<VersionNumber>,
}

impl ModuleResolver {
    pub fn new(
        executor: Arc<RequestExecutor>,
        session: Arc<PeerSession>,
        pinned_version: Option<VersionNumber>,
    ) -> Self {
        Self {
            executor,
            session,
            catalog: VersionCatalog::new(),
            table: EndpointTable::new(),
            pinned_version,
        }
    }

    pub fn catalog(&self) -> &VersionCatalog {
        &self.catalog
    }

    pub fn table(&self) -> &EndpointTable {
        &self.table
    }

    /// Selected version, treated as absent unless one of the caches knows it
    pub fn selected_version(&self) -> Option<VersionNumber> {
        self.session
            .selected_version()
            .filter(|v| self.catalog.contains(v) || self.table.contains(v))
    }

    pub fn select_version(&self, version: VersionNumber) {
        self.session.set_selected_version(Some(version));
    }

    pub fn clear_selected_version(&self) {
        self.session.set_selected_version(None);
    }

    /// `GET` the versions endpoint and replace the catalog on success
    pub async fn discover_versions(
        &self,
        cancel: &CancellationToken,
    ) -> RequestOutcome<Vec<VersionEntry>> {
        let spec = RequestSpec::new(
            Operation::GetVersions,
            HttpMethod::Get,
            self.session.versions_url(),
            self.session.token(),
        );
        let outcome = self.executor.send::<Vec<VersionEntry>>(&spec, cancel).await;

        if let Ok(response) = &outcome.result {
            let entries = response.data.as_deref().unwrap_or_default();
            self.catalog.replace_entries(entries);
            info!(count = entries.len(), "Version catalog refreshed");
        }

        outcome
    }

    /// `GET` a version-detail document and replace its Endpoint Table entry.
    ///
    /// The version is the explicit argument (or the pinned version), else the
    /// selected one. `select` makes it the selected version on success.
    pub async fn fetch_version_details(
        &self,
        version: Option<VersionNumber>,
        select: bool,
        cancel: &CancellationToken,
    ) -> RequestOutcome<VersionDetails> {
        let version = match version
            .or_else(|| self.pinned_version.clone())
            .or_else(|| self.selected_version())
        {
            Some(v) => v,
            None => {
                return RequestOutcome::local_failure(OcpiError::Configuration(
                    "no version selected for version details".to_string(),
                ))
            }
        };

        let Some(entry) = self.catalog.get(&version) else {
            return RequestOutcome::local_failure(OcpiError::Configuration(format!(
                "version {} is not offered by the remote party",
                version
            )));
        };

        let spec = RequestSpec::new(
            Operation::GetVersionDetails,
            HttpMethod::Get,
            entry.url,
            self.session.token(),
        );
        let outcome = self.executor.send::<VersionDetails>(&spec, cancel).await;

        let endpoints = match &outcome.result {
            Ok(response) => response.data.as_ref().map(|d| d.endpoints.clone()),
            Err(_) => return outcome,
        };

        match endpoints {
            Some(endpoints) => {
                debug!(%version, endpoints = endpoints.len(), "Endpoint table refreshed");
                self.table.replace(version.clone(), endpoints);
                if select {
                    self.session.set_selected_version(Some(version));
                }
                outcome
            }
            None => outcome.fail_with(OcpiError::Protocol {
                status_code: STATUS_SUCCESS,
                message: "version details response carried no data".to_string(),
            }),
        }
    }

    /// Choose the version a call runs against.
    ///
    /// Precedence:
    /// 1. the explicit argument, else the pinned version
    /// 2. the selected version, if a cache still knows it
    /// 3. the highest version in the Endpoint Table
    /// 4. the highest version in the Version Catalog
    /// 5. the highest version returned by a fresh discovery call
    ///
    /// A version found through steps 3-5 becomes the selected version.
    pub async fn resolve_version(
        &self,
        explicit: Option<VersionNumber>,
        cancel: &CancellationToken,
    ) -> Result<VersionNumber, OcpiError> {
        if let Some(version) = explicit.or_else(|| self.pinned_version.clone()) {
            return Ok(version);
        }
        if let Some(version) = self.selected_version() {
            return Ok(version);
        }

        let fallback = match self.table.highest().or_else(|| self.catalog.highest()) {
            Some(version) => version,
            None => {
                ensure_not_cancelled(cancel)?;
                let response = self.discover_versions(cancel).await.into_result()?;
                response
                    .data
                    .unwrap_or_default()
                    .into_iter()
                    .map(|entry| entry.version)
                    .max()
                    .ok_or_else(|| {
                        OcpiError::Configuration("remote party offers no versions".to_string())
                    })?
            }
        };

        debug!(version = %fallback, "Selected highest known version");
        self.session.set_selected_version(Some(fallback.clone()));
        Ok(fallback)
    }

    /// Resolve an endpoint, returning the version it was found under.
    ///
    /// `Ok(None)` means the remote does not implement the module in that role.
    pub async fn resolve_endpoint(
        &self,
        module: &ModuleId,
        role: InterfaceRole,
        version: Option<VersionNumber>,
        cancel: &CancellationToken,
    ) -> Result<Option<(VersionNumber, String)>, OcpiError> {
        let version = self.resolve_version(version, cancel).await?;

        let endpoints = match self.table.get(&version) {
            Some(endpoints) => endpoints,
            None => {
                if !self.catalog.contains(&version) {
                    ensure_not_cancelled(cancel)?;
                    self.discover_versions(cancel).await.into_result()?;
                }
                ensure_not_cancelled(cancel)?;
                self.fetch_version_details(Some(version.clone()), false, cancel)
                    .await
                    .into_result()?
                    .data
                    .map(|details| details.endpoints)
                    .unwrap_or_default()
            }
        };

        Ok(endpoints
            .into_iter()
            .find(|e| &e.identifier == module && e.role == role)
            .map(|e| (version, e.url)))
    }

    pub async fn resolve_module_url(
        &self,
        module: &ModuleId,
        role: InterfaceRole,
        version: Option<VersionNumber>,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, OcpiError> {
        Ok(self
            .resolve_endpoint(module, role, version, cancel)
            .await?
            .map(|(_, url)| url))
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), OcpiError> {
    if cancel.is_cancelled() {
        Err(OcpiError::Transport(TransportError::Cancelled))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientConfig, RetryPolicy};
    use crate::counters::CounterSet;
    use crate::error::ErrorClass;
    use crate::observer::ObserverSet;
    use crate::test_support::{envelope, error_envelope, MockReply, MockTransport};
    use serde_json::json;

    const VERSIONS_URL: &str = "https://cpo.example.com/ocpi/versions";
    const V221_URL: &str = "https://cpo.example.com/ocpi/2.2.1";
    const V211_URL: &str = "https://cpo.example.com/ocpi/2.1.1";
    const CREDENTIALS_URL: &str = "https://cpo.example.com/ocpi/2.2.1/credentials";

    fn resolver(transport: Arc<MockTransport>) -> ModuleResolver {
        let config = ClientConfig::default().with_retry(RetryPolicy::none());
        let executor = Arc::new(RequestExecutor::new(
            &config,
            transport,
            ObserverSet::new(),
            Arc::new(CounterSet::new()),
        ));
        let session = Arc::new(PeerSession::new(VERSIONS_URL, "token-b"));
        ModuleResolver::new(executor, session, None)
    }

    fn script_versions(transport: &MockTransport) {
        transport.push(
            HttpMethod::Get,
            VERSIONS_URL,
            MockReply::json(
                200,
                envelope(json!([
                    { "version": "2.1.1", "url": V211_URL },
                    { "version": "2.2.1", "url": V221_URL }
                ])),
            ),
        );
        transport.push(
            HttpMethod::Get,
            V221_URL,
            MockReply::json(
                200,
                envelope(json!({
                    "version": "2.2.1",
                    "endpoints": [
                        { "identifier": "credentials", "role": "RECEIVER", "url": CREDENTIALS_URL },
                        { "identifier": "locations", "role": "SENDER", "url": "https://cpo.example.com/ocpi/2.2.1/locations" }
                    ]
                })),
            ),
        );
    }

    #[tokio::test]
    async fn test_discovery_replaces_catalog() {
        let transport = Arc::new(MockTransport::new());
        script_versions(&transport);
        let resolver = resolver(transport);
        resolver.catalog().replace_entries(&[VersionEntry {
            version: "2.0".into(),
            url: "https://cpo.example.com/ocpi/2.0".to_string(),
        }]);

        let outcome = resolver.discover_versions(&CancellationToken::new()).await;

        assert!(outcome.is_success());
        assert_eq!(
            resolver.catalog().versions(),
            vec![VersionNumber::from("2.1.1"), VersionNumber::from("2.2.1")]
        );
    }

    #[tokio::test]
    async fn test_failed_discovery_leaves_catalog() {
        let transport = Arc::new(MockTransport::new());
        transport.push(
            HttpMethod::Get,
            VERSIONS_URL,
            MockReply::json(200, error_envelope(3000, "Generic server error")),
        );
        let resolver = resolver(transport);
        resolver.catalog().replace_entries(&[VersionEntry {
            version: "2.1.1".into(),
            url: V211_URL.to_string(),
        }]);

        let outcome = resolver.discover_versions(&CancellationToken::new()).await;

        assert_eq!(outcome.error_class(), Some(ErrorClass::Protocol));
        assert_eq!(resolver.catalog().versions(), vec![VersionNumber::from("2.1.1")]);
    }

    #[tokio::test]
    async fn test_lazy_discovery_for_explicit_version() {
        let transport = Arc::new(MockTransport::new());
        script_versions(&transport);
        let resolver = resolver(transport.clone());

        let url = resolver
            .resolve_module_url(
                &ModuleId::Credentials,
                InterfaceRole::Receiver,
                Some("2.2.1".into()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(url.as_deref(), Some(CREDENTIALS_URL));
        assert_eq!(transport.count(HttpMethod::Get, VERSIONS_URL), 1);
        assert_eq!(transport.count(HttpMethod::Get, V221_URL), 1);
        assert_eq!(transport.requests().len(), 2);
        // explicit versions are not auto-selected
        assert!(resolver.selected_version().is_none());
    }

    #[tokio::test]
    async fn test_repeated_resolution_uses_cache() {
        let transport = Arc::new(MockTransport::new());
        script_versions(&transport);
        let resolver = resolver(transport.clone());
        let cancel = CancellationToken::new();

        let first = resolver
            .resolve_module_url(&ModuleId::Credentials, InterfaceRole::Receiver, None, &cancel)
            .await
            .unwrap();
        let sent = transport.requests().len();
        let second = resolver
            .resolve_module_url(&ModuleId::Credentials, InterfaceRole::Receiver, None, &cancel)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.requests().len(), sent);
        assert_eq!(resolver.selected_version(), Some("2.2.1".into()));
    }

    #[tokio::test]
    async fn test_missing_module_is_not_an_error() {
        let transport = Arc::new(MockTransport::new());
        script_versions(&transport);
        let resolver = resolver(transport);

        let url = resolver
            .resolve_module_url(&ModuleId::Tariffs, InterfaceRole::Sender, None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(url.is_none());

        // locations exists, but only as SENDER
        let url = resolver
            .resolve_module_url(&ModuleId::Locations, InterfaceRole::Receiver, None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(url.is_none());
    }

    #[tokio::test]
    async fn test_stale_selection_is_re_resolved() {
        let transport = Arc::new(MockTransport::new());
        script_versions(&transport);
        let resolver = resolver(transport);
        resolver.select_version("9.9".into());
        assert!(resolver.selected_version().is_none());

        let version = resolver
            .resolve_version(None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(version, VersionNumber::from("2.2.1"));
        assert_eq!(resolver.selected_version(), Some("2.2.1".into()));
    }

    #[tokio::test]
    async fn test_table_takes_precedence_over_catalog() {
        let transport = Arc::new(MockTransport::new());
        let resolver = resolver(transport.clone());
        resolver.table().replace("2.1.1".into(), Vec::new());
        resolver.catalog().replace_entries(&[VersionEntry {
            version: "2.2.1".into(),
            url: V221_URL.to_string(),
        }]);

        let version = resolver
            .resolve_version(None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(version, VersionNumber::from("2.1.1"));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_version_details_without_version() {
        let transport = Arc::new(MockTransport::new());
        let resolver = resolver(transport.clone());

        let outcome = resolver
            .fetch_version_details(None, false, &CancellationToken::new())
            .await;

        assert_eq!(outcome.error_class(), Some(ErrorClass::Configuration));
        assert_eq!(outcome.attempts, 0);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_version_details_selects() {
        let transport = Arc::new(MockTransport::new());
        script_versions(&transport);
        let resolver = resolver(transport);
        let cancel = CancellationToken::new();
        resolver.discover_versions(&cancel).await;

        let outcome = resolver
            .fetch_version_details(Some("2.2.1".into()), true, &cancel)
            .await;

        assert!(outcome.is_success());
        assert_eq!(resolver.table().get(&"2.2.1".into()).map(|e| e.len()), Some(2));
        assert_eq!(resolver.selected_version(), Some("2.2.1".into()));
    }

    #[tokio::test]
    async fn test_cancelled_resolution_skips_discovery() {
        let transport = Arc::new(MockTransport::new());
        script_versions(&transport);
        let resolver = resolver(transport.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = resolver
            .resolve_module_url(&ModuleId::Credentials, InterfaceRole::Receiver, None, &cancel)
            .await;

        assert!(matches!(
            result,
            Err(OcpiError::Transport(TransportError::Cancelled))
        ));
        assert!(transport.requests().is_empty());
    }
}
