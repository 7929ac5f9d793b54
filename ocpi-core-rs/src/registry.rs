//! Party registry seam
//!
//! The registry of known remote parties is owned elsewhere. The client reads
//! a record once at construction and afterwards only requests conditional
//! updates after a successful registration or rotation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RegistryError;
use crate::types::{CredentialsRole, PartyIdentity};

/// Registry key of a remote party: its primary identity
pub type PartyKey = PartyIdentity;

/// Registration lifecycle of a remote party
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartyStatus {
    PreRegistration,
    Registered,
    Enabled,
}

/// Reachability of the remote party as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Online,
    Offline,
    Unknown,
}

/// Whether the remote party may call our endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessStatus {
    Allowed,
    Blocked,
}

/// Client certificate material, consumed by the transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsMaterial {
    pub client_certificate_pem: Option<String>,
    pub client_key_pem: Option<String>,
    pub root_certificate_pem: Option<String>,
}

/// What the registry knows about one remote party
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePartyRecord {
    /// Versions endpoint of the remote party
    pub versions_url: String,
    /// Token the remote party uses to call us
    pub local_token: Option<String>,
    /// Token we use to call the remote party
    pub remote_token: Option<String>,
    /// Out-of-band token authorizing the first registration call
    pub invitation_token: Option<String>,
    pub tls: Option<TlsMaterial>,
    pub status: PartyStatus,
    pub remote_status: ConnectionStatus,
    pub local_access: AccessStatus,
    pub roles: Vec<CredentialsRole>,
}

impl RemotePartyRecord {
    /// Record of a party we have only been invited to
    pub fn invited(versions_url: impl Into<String>, invitation_token: impl Into<String>) -> Self {
        Self {
            versions_url: versions_url.into(),
            local_token: None,
            remote_token: None,
            invitation_token: Some(invitation_token.into()),
            tls: None,
            status: PartyStatus::PreRegistration,
            remote_status: ConnectionStatus::Unknown,
            local_access: AccessStatus::Blocked,
            roles: Vec::new(),
        }
    }

    /// Record of a party we are already registered with
    pub fn registered(
        versions_url: impl Into<String>,
        local_token: impl Into<String>,
        remote_token: impl Into<String>,
    ) -> Self {
        Self {
            versions_url: versions_url.into(),
            local_token: Some(local_token.into()),
            remote_token: Some(remote_token.into()),
            invitation_token: None,
            tls: None,
            status: PartyStatus::Registered,
            remote_status: ConnectionStatus::Unknown,
            local_access: AccessStatus::Allowed,
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: CredentialsRole) -> Self {
        self.roles.push(role);
        self
    }

    pub fn with_tls(mut self, tls: TlsMaterial) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Token to authenticate outbound calls with
    pub fn access_token(&self) -> Option<&str> {
        self.remote_token
            .as_deref()
            .or(self.invitation_token.as_deref())
            .filter(|t| !t.is_empty())
    }

    /// Apply a patch; `None` fields keep their stored value
    pub fn apply(&mut self, patch: &PartyPatch) {
        if let Some(url) = &patch.versions_url {
            self.versions_url = url.clone();
        }
        if let Some(token) = &patch.local_token {
            self.local_token = Some(token.clone());
        }
        if let Some(token) = &patch.remote_token {
            self.remote_token = Some(token.clone());
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(status) = patch.remote_status {
            self.remote_status = status;
        }
        if let Some(access) = patch.local_access {
            self.local_access = access;
        }
        if let Some(roles) = &patch.roles {
            self.roles = roles.clone();
        }
    }
}

/// Partial update of a [`RemotePartyRecord`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartyPatch {
    pub versions_url: Option<String>,
    pub local_token: Option<String>,
    pub remote_token: Option<String>,
    pub status: Option<PartyStatus>,
    pub remote_status: Option<ConnectionStatus>,
    pub local_access: Option<AccessStatus>,
    pub roles: Option<Vec<CredentialsRole>>,
}

/// Precondition of a registry update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCondition {
    /// Upsert unconditionally
    Always,
    /// The record must exist and still hold this remote token
    RemoteTokenEquals(String),
}

/// Read and conditional-update access to the party registry
#[async_trait]
pub trait PartyRegistry: Send + Sync {
    async fn get(&self, key: &PartyKey) -> Result<Option<RemotePartyRecord>, RegistryError>;

    /// Atomically check `condition` and apply `patch`, returning the stored record
    async fn update(
        &self,
        key: &PartyKey,
        condition: UpdateCondition,
        patch: PartyPatch,
    ) -> Result<RemotePartyRecord, RegistryError>;
}

/// Registry kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    records: RwLock<HashMap<PartyKey, RemotePartyRecord>>,
    updates: AtomicUsize,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: PartyKey, record: RemotePartyRecord) {
        self.records.write().insert(key, record);
    }

    pub fn record(&self, key: &PartyKey) -> Option<RemotePartyRecord> {
        self.records.read().get(key).cloned()
    }

    /// Number of updates applied so far
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PartyRegistry for InMemoryRegistry {
    async fn get(&self, key: &PartyKey) -> Result<Option<RemotePartyRecord>, RegistryError> {
        Ok(self.record(key))
    }

    async fn update(
        &self,
        key: &PartyKey,
        condition: UpdateCondition,
        patch: PartyPatch,
    ) -> Result<RemotePartyRecord, RegistryError> {
        let mut records = self.records.write();

        if let UpdateCondition::RemoteTokenEquals(expected) = &condition {
            match records.get(key) {
                None => return Err(RegistryError::NotFound(key.to_string())),
                Some(record) if record.remote_token.as_deref() != Some(expected.as_str()) => {
                    return Err(RegistryError::ConditionFailed(format!(
                        "remote token of {} changed concurrently",
                        key
                    )));
                }
                Some(_) => {}
            }
        }

        let record = records.entry(key.clone()).or_insert_with(|| {
            let mut record =
                RemotePartyRecord::invited(patch.versions_url.clone().unwrap_or_default(), "");
            record.invitation_token = None;
            record
        });

        record.apply(&patch);
        self.updates.fetch_add(1, Ordering::SeqCst);
        debug!(party = %key, "Party record updated");
        Ok(record.clone())
    }
}
