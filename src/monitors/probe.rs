//! Probe engine - one availability check against one endpoint
//!
//! ## Check Flow
//!
//! ```text
//! GET url (browser headers, redirects, cert verification, fixed timeout)
//!     ├── response  → ClassificationMode::classify(status, body) → up | down
//!     └── error     → Timeout (408) | Tls (0) | Connection (0) | Request (0) → down
//! TLS handshake probe (https only, always runs) → ssl_status
//! ```
//!
//! A probe never returns an error. Every failure is captured on the
//! [`ProbeResult`].

use std::error::Error as StdError;
use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace, warn};

use crate::endpoints::Endpoint;

use super::tls::{TlsCheck, TlsProbe};

/// Timeout applied to both the HTTP request and the TLS handshake
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Synthetic HTTP status recorded for a timed-out request
pub const TIMEOUT_HTTP_STATUS: u16 = 408;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const MAX_REDIRECTS: usize = 10;

/// Availability verdict of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Up,
    Down,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Up => "up",
            Outcome::Down => "down",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SslStatus {
    Up,
    Down,
    NotApplicable,
}

impl fmt::Display for SslStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SslStatus::Up => "up",
            SslStatus::Down => "down",
            SslStatus::NotApplicable => "not_applicable",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordMatch {
    Matched,
    NotMatched,
    NotApplicable,
}

impl fmt::Display for KeywordMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeywordMatch::Matched => "matched",
            KeywordMatch::NotMatched => "not_matched",
            KeywordMatch::NotApplicable => "not_applicable",
        })
    }
}

/// Why the HTTP part of a probe failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Connection,
    Tls,
    Request,
}

impl FailureKind {
    /// Status code recorded in place of a real response
    pub fn synthetic_http_status(self) -> u16 {
        match self {
            FailureKind::Timeout => TIMEOUT_HTTP_STATUS,
            FailureKind::Connection | FailureKind::Tls | FailureKind::Request => 0,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Connection => "connection failed",
            FailureKind::Tls => "tls error",
            FailureKind::Request => "request failed",
        })
    }
}

/// Structured result of one probe; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub http_status: u16,
    pub ssl_status: SslStatus,
    pub keyword_match: KeywordMatch,
    pub outcome: Outcome,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub failure: Option<FailureKind>,
    pub error: Option<String>,
    pub ssl_error: Option<String>,
}

impl ProbeResult {
    pub fn is_up(&self) -> bool {
        self.outcome == Outcome::Up
    }
}

/// A check that turns an endpoint into a [`ProbeResult`]
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self, endpoint: &Endpoint) -> ProbeResult;

    /// Like [`check`](Probe::check), but network calls not yet started are
    /// skipped once `cancel` fires
    async fn check_cancellable(
        &self,
        endpoint: &Endpoint,
        _cancel: &CancellationToken,
    ) -> ProbeResult {
        self.check(endpoint).await
    }
}

/// HTTP failure with its category and a human-readable description
#[derive(Debug)]
struct HttpFailure {
    kind: FailureKind,
    message: String,
}

impl HttpFailure {
    fn from_reqwest(err: reqwest::Error) -> Self {
        // the url would otherwise leak into the heuristics below
        let err = err.without_url();
        let detail = error_chain(&err);

        let kind = if err.is_timeout() {
            FailureKind::Timeout
        } else if is_tls_failure(&err, &detail) {
            FailureKind::Tls
        } else if err.is_connect() {
            FailureKind::Connection
        } else {
            FailureKind::Request
        };

        let message = match kind {
            FailureKind::Timeout => "timeout".to_string(),
            _ => format!("{kind}: {detail}"),
        };

        Self { kind, message }
    }
}

/// Probe issuing a real HTTP GET plus an independent TLS handshake
pub struct HttpProbe {
    /// Reused across requests
    client: reqwest::Client,
    tls: TlsProbe,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .default_headers(browser_headers())
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()?;

        Ok(Self {
            client,
            tls: TlsProbe::new(timeout)?,
        })
    }

    /// Returns the status code and, when the classification needs it, the body
    async fn fetch(&self, url: &str, read_body: bool) -> Result<(u16, Option<String>), HttpFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(HttpFailure::from_reqwest)?;

        let status = response.status().as_u16();

        let body = if read_body {
            Some(response.text().await.map_err(HttpFailure::from_reqwest)?)
        } else {
            None
        };

        Ok((status, body))
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self, endpoint: &Endpoint) -> ProbeResult {
        self.check_cancellable(endpoint, &CancellationToken::new())
            .await
    }

    #[instrument(skip_all, fields(url = %endpoint.url))]
    async fn check_cancellable(
        &self,
        endpoint: &Endpoint,
        cancel: &CancellationToken,
    ) -> ProbeResult {
        let mode = endpoint.classification();

        let start = Instant::now();
        let fetched = self.fetch(&endpoint.url, mode.needs_body()).await;
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let timestamp = Utc::now();

        let (http_status, outcome, keyword_match, failure, error) = match fetched {
            Ok((status, body)) => {
                let (outcome, keyword_match) = mode.classify(status, body.as_deref());
                trace!("received {status} in {latency_ms}ms → {outcome}");
                (status, outcome, keyword_match, None, None)
            }
            Err(failure) => {
                warn!("probe failed: {}", failure.message);
                (
                    failure.kind.synthetic_http_status(),
                    Outcome::Down,
                    KeywordMatch::NotApplicable,
                    Some(failure.kind),
                    Some(failure.message),
                )
            }
        };

        // independent signal, evaluated even when the HTTP check already failed
        let tls = if cancel.is_cancelled() {
            trace!("shutting down, tls handshake skipped");
            TlsCheck::skipped()
        } else {
            self.tls.check(&endpoint.url).await
        };

        ProbeResult {
            http_status,
            ssl_status: tls.status,
            keyword_match,
            outcome,
            latency_ms,
            timestamp,
            failure,
            error,
            ssl_error: tls.error,
        }
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9,zh-CN;q=0.8"),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers
}

/// Render an error with all of its sources, `outer: inner: innermost`
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !rendered.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = cause.source();
    }
    rendered
}

fn is_tls_failure(err: &(dyn StdError + 'static), detail: &str) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(cause) = current {
        if cause.is::<rustls::Error>() {
            return true;
        }
        // io::Error::source skips the wrapped error, so look inside explicitly
        let wrapped = cause
            .downcast_ref::<std::io::Error>()
            .and_then(|io| io.get_ref());
        if wrapped.is_some_and(|inner| inner.is::<rustls::Error>()) {
            return true;
        }
        current = cause.source();
    }

    let detail = detail.to_lowercase();
    ["certificate", "tls handshake", "invalid peer"]
        .iter()
        .any(|needle| detail.contains(needle))
}
