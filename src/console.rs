//! Display surface over a running engine
//!
//! Every action is a single call returning a human-readable status line and
//! can be issued while the scheduler is running. Reads go through the shared
//! snapshot and log store; the only writes are the manual triggers.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Local;
use serde::Serialize;
use tracing::{info, instrument};

use crate::actors::scheduler::SchedulerHandle;
use crate::endpoints::JsonEndpointStore;
use crate::engine::Engine;
use crate::error::AlertError;
use crate::monitors::probe::Outcome;
use crate::snapshot::SnapshotEntry;

/// Lines shown when there is nothing new since the last refresh
const REFRESH_FALLBACK_LINES: usize = 200;

/// One row of the status table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRow {
    pub name: String,
    pub url: String,
    pub status: Outcome,
    pub http_status: u16,
    pub ssl_status: String,
    pub keyword: String,
    pub consecutive_failures: u32,
    pub latency_ms: u64,
    pub checked_at: String,
}

impl From<&SnapshotEntry> for StatusRow {
    fn from(entry: &SnapshotEntry) -> Self {
        Self {
            name: entry.name.clone(),
            url: entry.url.clone(),
            status: entry.result.outcome,
            http_status: entry.result.http_status,
            ssl_status: entry.result.ssl_status.to_string(),
            keyword: entry.result.keyword_match.to_string(),
            consecutive_failures: entry.consecutive_failures,
            latency_ms: entry.result.latency_ms,
            checked_at: entry
                .result
                .timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Console {
    engine: Engine,
    store: Arc<JsonEndpointStore>,
    scheduler: Option<SchedulerHandle>,
}

impl Console {
    pub fn new(engine: Engine, store: Arc<JsonEndpointStore>) -> Self {
        Self {
            engine,
            store,
            scheduler: None,
        }
    }

    /// Report the scheduler state in [`Console::status_report`]
    pub fn with_scheduler(mut self, scheduler: SchedulerHandle) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub async fn status_rows(&self) -> Vec<StatusRow> {
        self.engine
            .snapshot()
            .entries()
            .await
            .iter()
            .map(StatusRow::from)
            .collect()
    }

    /// Fixed-width table of the latest result per endpoint
    pub async fn status_table(&self) -> String {
        let rows = self.status_rows().await;
        if rows.is_empty() {
            return "no endpoint has been checked yet".to_string();
        }

        let mut table = format!(
            "{:<20} {:<6} {:>4} {:<15} {:<15} {:>8} {:>10}  {}\n",
            "NAME", "STATUS", "HTTP", "SSL", "KEYWORD", "FAILURES", "LATENCY", "URL"
        );
        for row in rows {
            let _ = writeln!(
                table,
                "{:<20} {:<6} {:>4} {:<15} {:<15} {:>8} {:>8}ms  {}",
                row.name,
                row.status.to_string(),
                row.http_status,
                row.ssl_status,
                row.keyword,
                row.consecutive_failures,
                row.latency_ms,
                row.url
            );
        }
        table
    }

    pub fn recent_logs(&self, n: usize) -> String {
        self.engine.logs().get_recent(n)
    }

    /// New lines since the last refresh, or the recent tail when nothing is new
    pub fn refresh_logs(&self) -> String {
        let new = self.engine.logs().drain_new();
        if new.is_empty() {
            self.engine.logs().get_recent(REFRESH_FALLBACK_LINES)
        } else {
            new
        }
    }

    #[instrument(skip(self))]
    pub async fn test_alert_transport(&self) -> String {
        let Some(alerts) = self.engine.alerts() else {
            return format!("test alert not sent: {}", AlertError::NotConfigured);
        };

        match alerts.send_test().await {
            Ok(()) => {
                self.engine
                    .logs()
                    .append(format!("[ALERT] test message sent via {}", alerts.transport_name()));
                format!("test alert sent via {}", alerts.transport_name())
            }
            Err(e) => {
                self.engine.logs().append(format!("[ALERT ERROR] test message failed: {e}"));
                format!("test alert failed: {e}")
            }
        }
    }

    pub fn force_log_cleanup(&self) -> String {
        match self.engine.logs().force_cleanup() {
            Ok(report) => {
                info!("{report}");
                report.to_string()
            }
            Err(e) => format!("log cleanup failed: {e}"),
        }
    }

    pub fn inspect_notification_state(&self) -> String {
        let states = self.engine.tracker().all();
        if states.is_empty() {
            return "no notification state recorded".to_string();
        }

        let mut text = format!("{} notification states:\n", states.len());
        for (url, state) in states {
            let _ = writeln!(
                text,
                "{url}: last notified {} at {} ({} consecutive failures)",
                state.status,
                state
                    .timestamp
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S"),
                state.consecutive_failures
            );
        }
        text
    }

    /// Forget the state of one endpoint, or of all endpoints when `url` is `None`
    pub fn clear_notification_state(&self, url: Option<&str>) -> String {
        let tracker = self.engine.tracker();
        match url {
            Some(url) => match tracker.clear(url) {
                Ok(true) => format!("cleared notification state for {url}"),
                Ok(false) => format!("no notification state recorded for {url}"),
                Err(e) => format!("failed to clear notification state for {url}: {e}"),
            },
            None => match tracker.clear_all() {
                Ok(count) => format!("cleared {count} notification states"),
                Err(e) => format!("failed to clear notification states: {e}"),
            },
        }
    }

    /// Delete the endpoint at `index` along with its notification state and snapshot entry
    pub async fn remove_endpoint(&self, index: usize) -> String {
        let removed = match self.store.delete(index).await {
            Ok((Some(removed), _)) => removed,
            Ok((None, remaining)) => {
                return format!(
                    "no endpoint at index {index} ({} endpoints configured)",
                    remaining.len()
                );
            }
            Err(e) => return format!("failed to remove endpoint {index}: {e}"),
        };

        self.engine.snapshot().remove(&removed.url).await;
        if let Err(e) = self.engine.tracker().clear(&removed.url) {
            return format!(
                "removed {} ({}) but failed to clear its notification state: {e}",
                removed.name, removed.url
            );
        }

        format!("removed {} ({})", removed.name, removed.url)
    }

    /// Log size, per-endpoint status and alert configuration in one text block
    pub async fn status_report(&self) -> String {
        let rows = self.status_rows().await;
        let up = rows.iter().filter(|row| row.status == Outcome::Up).count();

        let mut report = String::new();
        if let Some(scheduler) = &self.scheduler {
            let _ = writeln!(report, "scheduler: {}", scheduler.state());
        }
        let _ = writeln!(
            report,
            "log: {} lines in memory, file {}",
            self.engine.logs().len(),
            self.engine.logs().path().display()
        );
        let _ = writeln!(report, "endpoints: {} checked, {up} up, {} down", rows.len(), rows.len() - up);
        for row in &rows {
            let _ = writeln!(
                report,
                "  {} {} ({}) failures={} latency_ms={}",
                if row.status == Outcome::Up { "✅" } else { "🔴" },
                row.name,
                row.url,
                row.consecutive_failures,
                row.latency_ms
            );
        }

        match self.engine.alerts() {
            Some(alerts) => {
                let policy = alerts.policy();
                let _ = writeln!(
                    report,
                    "alerts: {} enabled, threshold {} failures, escalation {}",
                    alerts.transport_name(),
                    policy.failure_threshold,
                    policy
                        .max_escalation_alerts
                        .map_or_else(|| "unlimited".to_string(), |max| format!("up to {max} alerts"))
                );
            }
            None => {
                let _ = writeln!(report, "alerts: not configured");
            }
        }

        report
    }
}
