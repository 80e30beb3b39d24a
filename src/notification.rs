//! Notification decisions and the persisted per-endpoint notification state
//!
//! ## Decision Table
//!
//! ```text
//! should_alert_down (outcome == down, failures >= threshold):
//!   no prior state                           → alert
//!   prior up                                 → alert
//!   prior down, failures > recorded failures → alert (escalation)
//!   prior down, otherwise                    → suppress
//!
//! should_alert_recovery (outcome == up, previous == down, previous failures >= threshold):
//!   no prior state / prior down              → alert
//!   prior up                                 → suppress
//! ```
//!
//! The two decisions are pure. [`NotificationTracker::commit`] is the only
//! mutator and must be called only after an alert was actually delivered.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StateError;
use crate::monitors::probe::Outcome;

/// Default age after which [`NotificationTracker::prune_older_than`] drops a state
pub fn default_state_max_age() -> chrono::Duration {
    chrono::Duration::days(7)
}

/// What was last notified for an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationState {
    pub status: Outcome,
    pub timestamp: DateTime<Utc>,
    pub consecutive_failures: u32,
}

/// Whether a down alert should fire
pub fn decide_down(
    prior: Option<&NotificationState>,
    outcome: Outcome,
    consecutive_failures: u32,
    threshold: u32,
) -> bool {
    if outcome != Outcome::Down || consecutive_failures < threshold {
        return false;
    }

    match prior {
        None => true,
        Some(state) => match state.status {
            Outcome::Up => true,
            Outcome::Down => consecutive_failures > state.consecutive_failures,
        },
    }
}

/// Whether a recovery alert should fire
pub fn decide_recovery(
    prior: Option<&NotificationState>,
    outcome: Outcome,
    previous_outcome: Option<Outcome>,
    previous_consecutive_failures: u32,
    threshold: u32,
) -> bool {
    if outcome != Outcome::Up
        || previous_outcome != Some(Outcome::Down)
        || previous_consecutive_failures < threshold
    {
        return false;
    }

    prior.is_none_or(|state| state.status == Outcome::Down)
}

/// Notification state table backed by a JSON file
///
/// The whole table is rewritten on every mutation while holding the lock, so
/// concurrent commits for different endpoints cannot lose each other's updates.
#[derive(Debug)]
pub struct NotificationTracker {
    path: PathBuf,
    states: Mutex<BTreeMap<String, NotificationState>>,
}

impl NotificationTracker {
    /// Load the table; a missing or unreadable file starts empty
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let states = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(
                    "notification state {} is corrupt, starting empty: {e}",
                    path.display()
                );
                BTreeMap::new()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(
                    "failed to read notification state {}, starting empty: {e}",
                    path.display()
                );
                BTreeMap::new()
            }
        };

        debug!("loaded {} notification states", states.len());

        Self {
            path,
            states: Mutex::new(states),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, NotificationState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, url: &str) -> Option<NotificationState> {
        self.lock().get(url).cloned()
    }

    pub fn all(&self) -> BTreeMap<String, NotificationState> {
        self.lock().clone()
    }

    pub fn should_alert_down(
        &self,
        url: &str,
        outcome: Outcome,
        consecutive_failures: u32,
        threshold: u32,
    ) -> bool {
        decide_down(self.lock().get(url), outcome, consecutive_failures, threshold)
    }

    pub fn should_alert_recovery(
        &self,
        url: &str,
        outcome: Outcome,
        previous_outcome: Option<Outcome>,
        previous_consecutive_failures: u32,
        threshold: u32,
    ) -> bool {
        decide_recovery(
            self.lock().get(url),
            outcome,
            previous_outcome,
            previous_consecutive_failures,
            threshold,
        )
    }

    /// Record a delivered alert and persist the whole table
    ///
    /// The in-memory state is updated even when persisting fails.
    pub fn commit(
        &self,
        url: &str,
        status: Outcome,
        consecutive_failures: u32,
    ) -> Result<(), StateError> {
        let mut states = self.lock();
        states.insert(
            url.to_string(),
            NotificationState {
                status,
                timestamp: Utc::now(),
                consecutive_failures,
            },
        );
        self.persist(&states)
    }

    /// Forget an endpoint, returns whether a state existed
    pub fn clear(&self, url: &str) -> Result<bool, StateError> {
        let mut states = self.lock();
        if states.remove(url).is_none() {
            return Ok(false);
        }
        self.persist(&states)?;
        Ok(true)
    }

    /// Forget every endpoint, returns how many states were dropped
    pub fn clear_all(&self) -> Result<usize, StateError> {
        let mut states = self.lock();
        let count = states.len();
        states.clear();
        self.persist(&states)?;
        Ok(count)
    }

    /// Drop states last updated more than `max_age` ago
    pub fn prune_older_than(&self, max_age: chrono::Duration) -> Result<usize, StateError> {
        let cutoff = Utc::now() - max_age;
        let mut states = self.lock();
        let before = states.len();
        states.retain(|_, state| state.timestamp >= cutoff);
        let removed = before - states.len();
        if removed > 0 {
            self.persist(&states)?;
        }
        Ok(removed)
    }

    /// Write-temp-then-rename so readers never see a half-written table
    fn persist(&self, states: &BTreeMap<String, NotificationState>) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(states)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
