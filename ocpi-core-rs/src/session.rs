//! Mutable connection state towards one remote party

use parking_lot::RwLock;

use crate::types::VersionNumber;

/// Token, versions URL and selected version currently in use
#[derive(Debug)]
pub struct PeerSession {
    versions_url: RwLock<String>,
    token: RwLock<String>,
    selected_version: RwLock<Option<VersionNumber>>,
}

impl PeerSession {
    pub fn new(versions_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            versions_url: RwLock::new(versions_url.into()),
            token: RwLock::new(token.into()),
            selected_version: RwLock::new(None),
        }
    }

    pub fn versions_url(&self) -> String {
        self.versions_url.read().clone()
    }

    pub fn set_versions_url(&self, url: impl Into<String>) {
        *self.versions_url.write() = url.into();
    }

    /// Token authenticating our outbound calls
    pub fn token(&self) -> String {
        self.token.read().clone()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = token.into();
    }

    /// Raw selected version; callers must validate it against the caches
    pub fn selected_version(&self) -> Option<VersionNumber> {
        self.selected_version.read().clone()
    }

    pub fn set_selected_version(&self, version: Option<VersionNumber>) {
        *self.selected_version.write() = version;
    }
}
