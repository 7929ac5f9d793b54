//! Per-operation request counters
//!
//! Purely additive; nothing reads them to make decisions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Public operations of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Operation {
    GetVersions,
    GetVersionDetails,
    GetCredentials,
    PostCredentials,
    PutCredentials,
    DeleteCredentials,
    Register,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::GetVersions,
        Operation::GetVersionDetails,
        Operation::GetCredentials,
        Operation::PostCredentials,
        Operation::PutCredentials,
        Operation::DeleteCredentials,
        Operation::Register,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Default)]
struct CounterPair {
    requests: AtomicU64,
    successes: AtomicU64,
    errors: AtomicU64,
}

/// Exported counter values of one operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub errors: u64,
}

/// Success and error tallies for every [`Operation`]
#[derive(Debug, Default)]
pub struct CounterSet {
    counters: [CounterPair; 7],
}

impl CounterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished logical call
    pub fn increment(&self, operation: Operation, success: bool) {
        let pair = &self.counters[operation.index()];
        pair.requests.fetch_add(1, Ordering::Relaxed);
        if success {
            pair.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            pair.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get(&self, operation: Operation) -> CounterSnapshot {
        let pair = &self.counters[operation.index()];
        CounterSnapshot {
            requests: pair.requests.load(Ordering::Relaxed),
            successes: pair.successes.load(Ordering::Relaxed),
            errors: pair.errors.load(Ordering::Relaxed),
        }
    }

    pub fn snapshot(&self) -> BTreeMap<Operation, CounterSnapshot> {
        Operation::ALL
            .iter()
            .map(|op| (*op, self.get(*op)))
            .collect()
    }
}
