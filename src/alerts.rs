use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tracing::{error, info, instrument};

use crate::error::AlertError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const TEST_MESSAGE: &str = "🧪 <b>UptimeGuard test message</b>\n\nIf you can read this, alert delivery is configured correctly.";

/// A channel that can deliver a formatted alert body
#[async_trait]
pub trait AlertTransport: Send + Sync + Debug {
    /// Short name used in log lines
    fn name(&self) -> &str;

    async fn send(&self, text: &str) -> Result<(), AlertError>;
}

/// When a down alert may be sent at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    pub failure_threshold: u32,

    /// Escalation alerts after the first one, `None` for unlimited
    pub max_escalation_alerts: Option<u32>,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            max_escalation_alerts: Some(3),
        }
    }
}

impl AlertPolicy {
    /// Whether the failure count is still inside the alerting window
    pub fn permits_down_alert(&self, consecutive_failures: u32) -> bool {
        match self.max_escalation_alerts {
            None => true,
            Some(max) => {
                consecutive_failures <= self.failure_threshold.saturating_add(max)
            }
        }
    }
}

/// Minimal escaping for Telegram's HTML parse mode
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn format_down_message(
    name: &str,
    url: &str,
    consecutive_failures: u32,
    detected_at: DateTime<Local>,
    error: Option<&str>,
) -> String {
    let mut message = format!(
        "🚨 <b>Endpoint down</b>\n\n\
         📊 <b>Endpoint:</b>\n\
         • Name: {}\n\
         • URL: {}\n\
         • Consecutive failures: {}\n\n\
         ⏰ <b>Detected at:</b> {}",
        escape_html(name),
        escape_html(url),
        consecutive_failures,
        detected_at.format(TIMESTAMP_FORMAT),
    );

    if let Some(error) = error.filter(|e| !e.is_empty()) {
        message.push_str(&format!("\n\n🔍 <b>Error:</b> {}", escape_html(error)));
    }

    message
}

pub fn format_recovery_message(
    name: &str,
    url: &str,
    latency_ms: u64,
    recovered_at: DateTime<Local>,
) -> String {
    format!(
        "✅ <b>Endpoint recovered</b>\n\n\
         📊 <b>Endpoint:</b>\n\
         • Name: {}\n\
         • URL: {}\n\
         • Latency: {} ms\n\n\
         ⏰ <b>Recovered at:</b> {}",
        escape_html(name),
        escape_html(url),
        latency_ms,
        recovered_at.format(TIMESTAMP_FORMAT),
    )
}

/// Formats alerts and hands them to a transport
#[derive(Debug, Clone)]
pub struct AlertManager {
    transport: Arc<dyn AlertTransport>,
    policy: AlertPolicy,
}

impl AlertManager {
    pub fn new(transport: Arc<dyn AlertTransport>, policy: AlertPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> AlertPolicy {
        self.policy
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    #[instrument(skip(self, error))]
    pub async fn send_down_alert(
        &self,
        name: &str,
        url: &str,
        consecutive_failures: u32,
        error: Option<&str>,
    ) -> Result<(), AlertError> {
        let message =
            format_down_message(name, url, consecutive_failures, Local::now(), error);
        self.deliver(&message).await
    }

    #[instrument(skip(self))]
    pub async fn send_recovery_alert(
        &self,
        name: &str,
        url: &str,
        latency_ms: u64,
    ) -> Result<(), AlertError> {
        let message = format_recovery_message(name, url, latency_ms, Local::now());
        self.deliver(&message).await
    }

    pub async fn send_test(&self) -> Result<(), AlertError> {
        self.deliver(TEST_MESSAGE).await
    }

    async fn deliver(&self, message: &str) -> Result<(), AlertError> {
        match self.transport.send(message).await {
            Ok(()) => {
                info!("Successfully sent {} alert", self.transport.name());
                Ok(())
            }
            Err(e) => {
                error!("Failed to send {} alert: {e}", self.transport.name());
                Err(e)
            }
        }
    }
}
