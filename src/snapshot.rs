//! Latest probe result per endpoint
//!
//! Single writer (the scheduler), any number of concurrent readers. The map is
//! guarded by an async `RwLock`; readers always observe whole entries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::endpoints::Endpoint;
use crate::monitors::probe::{Outcome, ProbeResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEntry {
    pub name: String,
    pub url: String,
    pub result: ProbeResult,

    /// Length of the trailing run of `down` outcomes
    pub consecutive_failures: u32,
}

impl SnapshotEntry {
    /// Fold a fresh result into the previous entry (none on the first check)
    pub fn next(previous: Option<&SnapshotEntry>, endpoint: &Endpoint, result: ProbeResult) -> Self {
        let consecutive_failures = match result.outcome {
            Outcome::Up => 0,
            Outcome::Down => previous
                .map_or(0, |entry| entry.consecutive_failures)
                .saturating_add(1),
        };

        Self {
            name: endpoint.name.clone(),
            url: endpoint.url.clone(),
            result,
            consecutive_failures,
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.result.outcome
    }
}

/// Shared, cloneable handle to the status table keyed by endpoint url
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    entries: Arc<RwLock<HashMap<String, SnapshotEntry>>>,
}

impl StatusSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result, returning the previous and the new entry
    pub async fn update(
        &self,
        endpoint: &Endpoint,
        result: ProbeResult,
    ) -> (Option<SnapshotEntry>, SnapshotEntry) {
        let mut entries = self.entries.write().await;
        let previous = entries.get(&endpoint.url).cloned();
        let entry = SnapshotEntry::next(previous.as_ref(), endpoint, result);
        entries.insert(endpoint.url.clone(), entry.clone());
        (previous, entry)
    }

    pub async fn get(&self, url: &str) -> Option<SnapshotEntry> {
        self.entries.read().await.get(url).cloned()
    }

    /// Copy of all entries, sorted by url
    pub async fn entries(&self) -> Vec<SnapshotEntry> {
        let mut entries: Vec<_> = self.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.url.cmp(&b.url));
        entries
    }

    pub async fn remove(&self, url: &str) -> Option<SnapshotEntry> {
        self.entries.write().await.remove(url)
    }

    /// Drop entries whose url is no longer monitored
    pub async fn retain_urls(&self, urls: &HashSet<&str>) {
        self.entries
            .write()
            .await
            .retain(|url, _| urls.contains(url.as_str()));
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
