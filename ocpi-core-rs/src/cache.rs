//! Version Catalog and Endpoint Table
//!
//! Both caches are keyed by [`VersionNumber`] and only ever replaced, never
//! merged: the catalog as a whole on every successful discovery, a table
//! entry as a whole whenever that version's detail document is re-fetched.
//! Each write is atomic on its own; there is no cross-key transaction.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::types::{Endpoint, VersionEntry, VersionNumber};

/// Concurrency-safe map from version to cached data
#[derive(Debug)]
pub struct VersionCache<V> {
    entries: RwLock<BTreeMap<VersionNumber, V>>,
}

impl<V> Default for VersionCache<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<V: Clone> VersionCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, version: &VersionNumber) -> Option<V> {
        self.entries.read().get(version).cloned()
    }

    pub fn contains(&self, version: &VersionNumber) -> bool {
        self.entries.read().contains_key(version)
    }

    /// Highest version present
    pub fn highest(&self) -> Option<VersionNumber> {
        self.entries.read().keys().next_back().cloned()
    }

    pub fn versions(&self) -> Vec<VersionNumber> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn snapshot(&self) -> BTreeMap<VersionNumber, V> {
        self.entries.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Replace the entry of one version
    pub fn replace(&self, version: VersionNumber, value: V) {
        self.entries.write().insert(version, value);
    }

    /// Replace the whole map; versions absent from `entries` disappear
    pub fn replace_all(&self, entries: impl IntoIterator<Item = (VersionNumber, V)>) {
        let fresh: BTreeMap<_, _> = entries.into_iter().collect();
        *self.entries.write() = fresh;
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

/// version → detail-document URL
pub type VersionCatalog = VersionCache<VersionEntry>;

/// version → endpoints of that version, in document order
pub type EndpointTable = VersionCache<Vec<Endpoint>>;

impl VersionCache<VersionEntry> {
    /// Replace the catalog with a fresh discovery response
    pub fn replace_entries(&self, entries: &[VersionEntry]) {
        self.replace_all(entries.iter().map(|e| (e.version.clone(), e.clone())));
    }
}
