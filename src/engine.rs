//! One poll cycle over every monitored endpoint
//!
//! ## Per-endpoint Flow
//!
//! ```text
//! Probe::check → StatusSnapshot::update → LogStore::append
//!                                              ↓
//!                 NotificationTracker decision + AlertPolicy window
//!                                              ↓
//!                  AlertManager::send → (only on success) NotificationTracker::commit
//! ```
//!
//! Endpoints are processed one after another in store order. Each endpoint
//! runs inside its own unwind boundary, so a panicking probe only loses that
//! endpoint's result for the cycle.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::alerts::AlertManager;
use crate::endpoints::{Endpoint, EndpointStore};
use crate::logs::LogStore;
use crate::monitors::probe::{Outcome, Probe};
use crate::notification::NotificationTracker;
use crate::snapshot::{SnapshotEntry, StatusSnapshot};

/// Summary of one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Endpoints whose result reached the snapshot
    pub probed: usize,
    pub up: usize,
    pub down: usize,
    pub alerts_sent: usize,
    pub alert_failures: usize,

    /// Endpoints left out because of cancellation or a panic
    pub skipped: usize,
}

impl CycleReport {
    fn record(&mut self, processed: Processed) {
        self.probed += 1;
        match processed.outcome {
            Outcome::Up => self.up += 1,
            Outcome::Down => self.down += 1,
        }
        match processed.delivery {
            Delivery::Sent => self.alerts_sent += 1,
            Delivery::Failed => self.alert_failures += 1,
            Delivery::NotAttempted => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    NotAttempted,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct Processed {
    outcome: Outcome,
    delivery: Delivery,
}

/// Everything a cycle reads from and writes to
#[derive(Clone)]
pub struct Engine {
    endpoints: Arc<dyn EndpointStore>,
    probe: Arc<dyn Probe>,
    snapshot: StatusSnapshot,
    tracker: Arc<NotificationTracker>,
    alerts: Option<AlertManager>,
    logs: Arc<LogStore>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("snapshot", &self.snapshot)
            .field("tracker", &self.tracker.path())
            .field("alerts", &self.alerts)
            .field("logs", &self.logs.path())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        endpoints: Arc<dyn EndpointStore>,
        probe: Arc<dyn Probe>,
        snapshot: StatusSnapshot,
        tracker: Arc<NotificationTracker>,
        logs: Arc<LogStore>,
    ) -> Self {
        Self {
            endpoints,
            probe,
            snapshot,
            tracker,
            alerts: None,
            logs,
        }
    }

    /// Enable alerting; without a manager no alert is ever attempted
    pub fn with_alerts(mut self, alerts: AlertManager) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn snapshot(&self) -> &StatusSnapshot {
        &self.snapshot
    }

    pub fn tracker(&self) -> &Arc<NotificationTracker> {
        &self.tracker
    }

    pub fn logs(&self) -> &Arc<LogStore> {
        &self.logs
    }

    pub fn alerts(&self) -> Option<&AlertManager> {
        self.alerts.as_ref()
    }

    /// Probe every endpoint once
    ///
    /// Cancellation is honored between endpoints and between the network
    /// calls of one probe; a request already in flight is finished first.
    #[instrument(skip_all)]
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::default();

        match self.logs.cleanup_if_due() {
            Some(Ok(cleanup)) => debug!("{cleanup}"),
            Some(Err(e)) => error!("log cleanup failed: {e}"),
            None => {}
        }

        let endpoints = match self.endpoints.load().await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!("failed to load endpoints: {e}");
                self.logs.append(format!("[ERROR] failed to load endpoints: {e}"));
                return report;
            }
        };

        let urls: HashSet<&str> = endpoints.iter().map(|e| e.url.as_str()).collect();
        self.snapshot.retain_urls(&urls).await;

        for (index, endpoint) in endpoints.iter().enumerate() {
            if cancel.is_cancelled() {
                report.skipped += endpoints.len() - index;
                debug!("cycle cancelled, skipping {} endpoints", endpoints.len() - index);
                break;
            }

            match AssertUnwindSafe(self.process_endpoint(endpoint, cancel))
                .catch_unwind()
                .await
            {
                Ok(processed) => report.record(processed),
                Err(panic) => {
                    report.skipped += 1;
                    let reason = panic_message(panic.as_ref());
                    error!("check of {} panicked: {reason}", endpoint.url);
                    self.logs.append(format!(
                        "[ERROR] check of {} ({}) panicked: {reason}",
                        endpoint.name, endpoint.url
                    ));
                }
            }
        }

        debug!("cycle finished: {report:?}");
        report
    }

    #[instrument(skip(self, endpoint, cancel), fields(url = %endpoint.url))]
    async fn process_endpoint(
        &self,
        endpoint: &Endpoint,
        cancel: &CancellationToken,
    ) -> Processed {
        let result = self.probe.check_cancellable(endpoint, cancel).await;
        let (previous, entry) = self.snapshot.update(endpoint, result).await;

        self.logs.append(check_line(&entry));

        let delivery = match &self.alerts {
            Some(alerts) => self.evaluate_alerts(alerts, previous.as_ref(), &entry).await,
            None => Delivery::NotAttempted,
        };

        Processed {
            outcome: entry.outcome(),
            delivery,
        }
    }

    async fn evaluate_alerts(
        &self,
        alerts: &AlertManager,
        previous: Option<&SnapshotEntry>,
        entry: &SnapshotEntry,
    ) -> Delivery {
        let policy = alerts.policy();
        let threshold = policy.failure_threshold;
        let failures = entry.consecutive_failures;

        match entry.outcome() {
            Outcome::Down => {
                if !self
                    .tracker
                    .should_alert_down(&entry.url, Outcome::Down, failures, threshold)
                {
                    return Delivery::NotAttempted;
                }
                if !policy.permits_down_alert(failures) {
                    debug!("{failures} failures are past the escalation window");
                    return Delivery::NotAttempted;
                }

                let sent = alerts
                    .send_down_alert(
                        &entry.name,
                        &entry.url,
                        failures,
                        entry.result.error.as_deref(),
                    )
                    .await;

                match sent {
                    Ok(()) => {
                        self.logs.append(format!(
                            "[ALERT] down alert sent for {} ({}) after {failures} consecutive failures",
                            entry.name, entry.url
                        ));
                        self.commit(&entry.url, Outcome::Down, failures);
                        Delivery::Sent
                    }
                    Err(e) => {
                        self.logs.append(format!(
                            "[ALERT ERROR] down alert for {} ({}) failed: {e}",
                            entry.name, entry.url
                        ));
                        Delivery::Failed
                    }
                }
            }
            Outcome::Up => {
                let previous_outcome = previous.map(SnapshotEntry::outcome);
                let previous_failures = previous.map_or(0, |p| p.consecutive_failures);

                if !self.tracker.should_alert_recovery(
                    &entry.url,
                    Outcome::Up,
                    previous_outcome,
                    previous_failures,
                    threshold,
                ) {
                    return Delivery::NotAttempted;
                }

                let sent = alerts
                    .send_recovery_alert(&entry.name, &entry.url, entry.result.latency_ms)
                    .await;

                match sent {
                    Ok(()) => {
                        self.logs.append(format!(
                            "[ALERT] recovery alert sent for {} ({}), latency {} ms",
                            entry.name, entry.url, entry.result.latency_ms
                        ));
                        self.commit(&entry.url, Outcome::Up, 0);
                        Delivery::Sent
                    }
                    Err(e) => {
                        self.logs.append(format!(
                            "[ALERT ERROR] recovery alert for {} ({}) failed: {e}",
                            entry.name, entry.url
                        ));
                        Delivery::Failed
                    }
                }
            }
        }
    }

    fn commit(&self, url: &str, status: Outcome, consecutive_failures: u32) {
        if let Err(e) = self.tracker.commit(url, status, consecutive_failures) {
            warn!("failed to persist notification state: {e}");
            self.logs
                .append(format!("[ERROR] failed to persist notification state for {url}: {e}"));
        }
    }
}

/// The log line recorded for every probe
pub fn check_line(entry: &SnapshotEntry) -> String {
    let result = &entry.result;
    let mut line = format!(
        "name={} url={} status={} http={} ssl={} keyword={} latency_ms={} failures={}",
        entry.name,
        entry.url,
        result.outcome,
        result.http_status,
        result.ssl_status,
        result.keyword_match,
        result.latency_ms,
        entry.consecutive_failures,
    );
    if let Some(error) = &result.error {
        line.push_str(&format!(" error={error}"));
    }
    if let Some(ssl_error) = &result.ssl_error {
        line.push_str(&format!(" ssl_error={ssl_error}"));
    }
    line
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
