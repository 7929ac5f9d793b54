//! Credentials registration and rotation
//!
//! Issues the five credentials-module calls against the remote party's
//! `credentials` RECEIVER endpoint:
//!
//! | Operation | Method | Registry update |
//! |-----------|--------|-----------------|
//! | GetCredentials | GET | never |
//! | PostCredentials | POST | never |
//! | DeleteCredentials | DELETE | never |
//! | PutCredentials | PUT | when the returned roles match the known roles |
//! | Register | POST | on success (upsert) |
//!
//! Register exchanges three tokens over one call: the invitation token
//! authenticates the POST, the payload carries the token the remote will use
//! to call us, and the response carries the token we use from then on.
//!
//! Concurrent Register/PutCredentials calls on the same client are not
//! serialized; their registry updates race and the last write wins.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::IgnoredAny;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::LocalPartyConfig;
use crate::counters::Operation;
use crate::error::{OcpiError, RegistryError};
use crate::executor::{RequestExecutor, RequestOutcome, RequestSpec};
use crate::registry::{
    AccessStatus, ConnectionStatus, PartyKey, PartyPatch, PartyRegistry, PartyStatus,
    UpdateCondition,
};
use crate::resolver::ModuleResolver;
use crate::session::PeerSession;
use crate::transport::HttpMethod;
use crate::types::{Credentials, CredentialsRole, InterfaceRole, ModuleId, VersionNumber, STATUS_SUCCESS};

/// What happened to the party registry after an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryUpdate {
    /// The operation never updates the registry, or did not succeed
    NotRequested,
    Applied,
    /// The returned roles did not match the known ones; trust state unchanged
    SkippedValidation(String),
    Failed(RegistryError),
}

impl RegistryUpdate {
    /// Validation error behind a skipped update
    pub fn validation_error(&self) -> Option<OcpiError> {
        match self {
            RegistryUpdate::SkippedValidation(reason) => {
                Some(OcpiError::Validation(reason.clone()))
            }
            _ => None,
        }
    }
}

/// Outcome of a credentials operation
#[derive(Debug)]
pub struct RegistrationOutcome {
    pub outcome: RequestOutcome<Credentials>,
    pub registry: RegistryUpdate,
}

impl RegistrationOutcome {
    fn new(outcome: RequestOutcome<Credentials>, registry: RegistryUpdate) -> Self {
        Self { outcome, registry }
    }

    fn unchanged(outcome: RequestOutcome<Credentials>) -> Self {
        Self::new(outcome, RegistryUpdate::NotRequested)
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.outcome.data()
    }
}

/// Parameters of an initial registration
#[derive(Debug, Clone, Default)]
pub struct RegisterRequest {
    /// Authenticates this call instead of the current token; kept only if
    /// the registration succeeds
    pub invitation_token: Option<String>,
    /// Token the remote party will use to call us; minted when absent
    pub local_token: Option<String>,
    /// Version to register under; resolved like any other call when absent
    pub version: Option<VersionNumber>,
}

/// Orchestrates credential issuance and rotation towards one party
pub struct RegistrationProtocol {
    resolver: Arc<ModuleResolver>,
    executor: Arc<RequestExecutor>,
    session: Arc<PeerSession>,
    registry: Arc<dyn PartyRegistry>,
    party: PartyKey,
    local: LocalPartyConfig,
    /// Roles known for the party before any call was made
    known_roles: Vec<CredentialsRole>,
    /// Token the remote currently uses to call us
    local_token: RwLock<Option<String>>,
}

impl RegistrationProtocol {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resolver: Arc<ModuleResolver>,
        executor: Arc<RequestExecutor>,
        session: Arc<PeerSession>,
        registry: Arc<dyn PartyRegistry>,
        party: PartyKey,
        local: LocalPartyConfig,
        known_roles: Vec<CredentialsRole>,
        local_token: Option<String>,
    ) -> Self {
        Self {
            resolver,
            executor,
            session,
            registry,
            party,
            local,
            known_roles,
            local_token: RwLock::new(local_token),
        }
    }

    pub fn party(&self) -> &PartyKey {
        &self.party
    }

    pub fn local_token(&self) -> Option<String> {
        self.local_token.read().clone()
    }

    /// Credentials object advertising ourselves with `token`
    fn own_credentials(&self, token: String) -> Credentials {
        Credentials {
            token,
            url: self.local.versions_url.clone(),
            roles: self.local.roles.clone(),
        }
    }

    /// Resolve the remote credentials RECEIVER endpoint
    async fn credentials_endpoint(
        &self,
        version: Option<VersionNumber>,
        cancel: &CancellationToken,
    ) -> Result<(VersionNumber, String), OcpiError> {
        self.resolver
            .resolve_endpoint(&ModuleId::Credentials, InterfaceRole::Receiver, version, cancel)
            .await?
            .ok_or_else(|| {
                OcpiError::Configuration(format!(
                    "party {} exposes no credentials receiver endpoint",
                    self.party
                ))
            })
    }

    /// Send to the credentials endpoint, authenticating with `token` or the
    /// session token
    async fn call(
        &self,
        operation: Operation,
        method: HttpMethod,
        body: Option<&Credentials>,
        version: Option<VersionNumber>,
        token: Option<String>,
        cancel: &CancellationToken,
    ) -> (Option<VersionNumber>, RequestOutcome<Credentials>) {
        let (version, url) = match self.credentials_endpoint(version, cancel).await {
            Ok(endpoint) => endpoint,
            Err(e) => return (None, RequestOutcome::local_failure(e)),
        };

        let token = token.unwrap_or_else(|| self.session.token());
        let spec = RequestSpec::new(operation, method, url, token);
        let spec = match body {
            Some(body) => match spec.with_json(body) {
                Ok(spec) => spec,
                Err(e) => return (Some(version), RequestOutcome::local_failure(e)),
            },
            None => spec,
        };

        (Some(version), self.executor.send(&spec, cancel).await)
    }

    /// `GET` the credentials the remote party holds for us
    pub async fn get_credentials(&self, cancel: &CancellationToken) -> RegistrationOutcome {
        let (_, outcome) = self
            .call(Operation::GetCredentials, HttpMethod::Get, None, None, None, cancel)
            .await;
        RegistrationOutcome::unchanged(outcome)
    }

    /// `POST` a credentials object as is
    pub async fn post_credentials(
        &self,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> RegistrationOutcome {
        let (_, outcome) = self
            .call(
                Operation::PostCredentials,
                HttpMethod::Post,
                Some(credentials),
                None,
                None,
                cancel,
            )
            .await;
        RegistrationOutcome::unchanged(outcome)
    }

    /// `DELETE` our credentials at the remote party
    pub async fn delete_credentials(&self, cancel: &CancellationToken) -> RequestOutcome<()> {
        let url = match self.credentials_endpoint(None, cancel).await {
            Ok((_, url)) => url,
            Err(e) => return RequestOutcome::local_failure(e),
        };

        let spec = RequestSpec::new(
            Operation::DeleteCredentials,
            HttpMethod::Delete,
            url,
            self.session.token(),
        );
        self.executor
            .send::<IgnoredAny>(&spec, cancel)
            .await
            .map(|_| ())
    }

    /// Rotate credentials with an already registered party.
    ///
    /// Sends `new_local_token`, or the current local token when `None`. On
    /// success the returned token authenticates all further calls. The
    /// registry is only updated when the returned roles match the known ones;
    /// otherwise the credentials are still returned as a success.
    pub async fn put_credentials(
        &self,
        new_local_token: Option<String>,
        cancel: &CancellationToken,
    ) -> RegistrationOutcome {
        let Some(local_token) = new_local_token.or_else(|| self.local_token()) else {
            return RegistrationOutcome::unchanged(RequestOutcome::local_failure(
                OcpiError::Configuration(format!("no local token known for party {}", self.party)),
            ));
        };

        let previous_token = self.session.token();
        let body = self.own_credentials(local_token.clone());
        let (_, outcome) = self
            .call(Operation::PutCredentials, HttpMethod::Put, Some(&body), None, None, cancel)
            .await;

        let (outcome, credentials) = match accepted_credentials(outcome) {
            Ok(accepted) => accepted,
            Err(outcome) => return RegistrationOutcome::unchanged(outcome),
        };

        self.session.set_token(credentials.token.clone());

        if let Err(reason) = validate_roles(&self.known_roles, &credentials.roles) {
            warn!(party = %self.party, "Credentials rotated without registry update: {}", reason);
            return RegistrationOutcome::new(outcome, RegistryUpdate::SkippedValidation(reason));
        }

        let patch = PartyPatch {
            versions_url: Some(credentials.url.clone()),
            local_token: Some(local_token.clone()),
            remote_token: Some(credentials.token.clone()),
            remote_status: Some(ConnectionStatus::Online),
            local_access: Some(AccessStatus::Allowed),
            ..Default::default()
        };
        let registry = self
            .apply_patch(UpdateCondition::RemoteTokenEquals(previous_token), patch)
            .await;

        *self.local_token.write() = Some(local_token);
        self.session.set_versions_url(credentials.url);
        info!(party = %self.party, "Credentials rotated");

        RegistrationOutcome::new(outcome, registry)
    }

    /// Initial registration with a party we hold an invitation token for.
    ///
    /// Only tokens and the versions URL are taken from the response; the
    /// roles stored for the party stay the ones known before the call.
    /// The session token only changes once the remote accepted the call.
    pub async fn register(
        &self,
        request: RegisterRequest,
        cancel: &CancellationToken,
    ) -> RegistrationOutcome {
        let local_token = request
            .local_token
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let body = self.own_credentials(local_token.clone());

        let (version, outcome) = self
            .call(
                Operation::Register,
                HttpMethod::Post,
                Some(&body),
                request.version,
                request.invitation_token,
                cancel,
            )
            .await;

        let (outcome, credentials) = match accepted_credentials(outcome) {
            Ok(accepted) => accepted,
            Err(outcome) => return RegistrationOutcome::unchanged(outcome),
        };

        self.session.set_token(credentials.token.clone());
        if let Some(version) = version {
            self.resolver.select_version(version);
        }

        let patch = PartyPatch {
            versions_url: Some(credentials.url.clone()),
            local_token: Some(local_token.clone()),
            remote_token: Some(credentials.token.clone()),
            status: Some(PartyStatus::Enabled),
            remote_status: Some(ConnectionStatus::Online),
            local_access: Some(AccessStatus::Allowed),
            roles: Some(self.known_roles.clone()),
        };
        let registry = self.apply_patch(UpdateCondition::Always, patch).await;

        *self.local_token.write() = Some(local_token);
        self.session.set_versions_url(credentials.url);
        info!(party = %self.party, "Registered with remote party");

        RegistrationOutcome::new(outcome, registry)
    }

    async fn apply_patch(&self, condition: UpdateCondition, patch: PartyPatch) -> RegistryUpdate {
        match self.registry.update(&self.party, condition, patch).await {
            Ok(_) => RegistryUpdate::Applied,
            Err(e) => {
                warn!(party = %self.party, "Party registry update failed: {}", e);
                RegistryUpdate::Failed(e)
            }
        }
    }
}

/// Split a successful outcome into itself and a non-empty credentials payload
fn accepted_credentials(
    outcome: RequestOutcome<Credentials>,
) -> Result<(RequestOutcome<Credentials>, Credentials), RequestOutcome<Credentials>> {
    if outcome.result.is_err() {
        return Err(outcome);
    }
    match outcome.data().filter(|c| !c.token.is_empty()).cloned() {
        Some(credentials) => Ok((outcome, credentials)),
        None => Err(outcome.fail_with(OcpiError::Protocol {
            status_code: STATUS_SUCCESS,
            message: "response carried no credentials".to_string(),
        })),
    }
}

/// Returned roles must have the known cardinality and each (party id, role)
/// pair must already be known
fn validate_roles(known: &[CredentialsRole], returned: &[CredentialsRole]) -> Result<(), String> {
    if known.len() != returned.len() {
        return Err(format!(
            "role count changed from {} to {}",
            known.len(),
            returned.len()
        ));
    }

    for role in returned {
        let matches = known
            .iter()
            .any(|k| k.role == role.role && k.party_id.eq_ignore_ascii_case(&role.party_id));
        if !matches {
            return Err(format!("unknown role {} for party {}", role.role, role.party_id));
        }
    }

    Ok(())
}
