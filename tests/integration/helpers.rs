//! Helper types for integration tests
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uptime_guard::alerts::{AlertManager, AlertPolicy, AlertTransport};
use uptime_guard::endpoints::{Endpoint, EndpointStore};
use uptime_guard::engine::Engine;
use uptime_guard::error::{AlertError, StoreError};
use uptime_guard::logs::LogStore;
use uptime_guard::monitors::probe::{
    FailureKind, KeywordMatch, Outcome, Probe, ProbeResult, SslStatus,
};
use uptime_guard::notification::NotificationTracker;
use uptime_guard::snapshot::StatusSnapshot;

pub fn probe_result(outcome: Outcome) -> ProbeResult {
    match outcome {
        Outcome::Up => ProbeResult {
            http_status: 200,
            ssl_status: SslStatus::NotApplicable,
            keyword_match: KeywordMatch::NotApplicable,
            outcome,
            latency_ms: 25,
            timestamp: Utc::now(),
            failure: None,
            error: None,
            ssl_error: None,
        },
        Outcome::Down => ProbeResult {
            http_status: 408,
            ssl_status: SslStatus::NotApplicable,
            keyword_match: KeywordMatch::NotApplicable,
            outcome,
            latency_ms: 10_000,
            timestamp: Utc::now(),
            failure: Some(FailureKind::Timeout),
            error: Some("timeout".to_string()),
            ssl_error: None,
        },
    }
}

/// Probe replaying scripted outcomes per url, `up` once a script runs out
#[derive(Default)]
pub struct ScriptedProbe {
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    panic_on: Mutex<Option<String>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn script(&self, url: &str, outcomes: impl IntoIterator<Item = Outcome>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .extend(outcomes);
    }

    pub fn panic_on(&self, url: &str) {
        *self.panic_on.lock().unwrap() = Some(url.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn check(&self, endpoint: &Endpoint) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let should_panic = self.panic_on.lock().unwrap().as_deref() == Some(endpoint.url.as_str());
        if should_panic {
            panic!("scripted probe failure for {}", endpoint.url);
        }

        let outcome = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&endpoint.url)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Outcome::Up);

        probe_result(outcome)
    }
}

/// Transport keeping every message in memory
#[derive(Debug, Default)]
pub struct RecordingTransport {
    messages: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn down_alerts(&self) -> usize {
        self.messages()
            .iter()
            .filter(|m| m.contains("Endpoint down"))
            .count()
    }

    pub fn recovery_alerts(&self) -> usize {
        self.messages()
            .iter()
            .filter(|m| m.contains("Endpoint recovered"))
            .count()
    }
}

#[async_trait]
impl AlertTransport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, text: &str) -> Result<(), AlertError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AlertError::Rejected("scripted failure".to_string()));
        }
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// In-memory endpoint list
#[derive(Debug, Default)]
pub struct StaticStore {
    endpoints: Mutex<Vec<Endpoint>>,
    failing: AtomicBool,
}

impl StaticStore {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints: Mutex::new(endpoints),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set(&self, endpoints: Vec<Endpoint>) {
        *self.endpoints.lock().unwrap() = endpoints;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl EndpointStore for StaticStore {
    async fn load(&self) -> Result<Vec<Endpoint>, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("store unavailable")));
        }
        Ok(self.endpoints.lock().unwrap().clone())
    }
}

/// Engine wired to test doubles, with files under `dir`
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub probe: Arc<ScriptedProbe>,
    pub store: Arc<StaticStore>,
    pub transport: Arc<RecordingTransport>,
    pub engine: Engine,
}

impl Harness {
    pub fn new(endpoints: Vec<Endpoint>, policy: AlertPolicy) -> Self {
        Self::with_probe(endpoints, policy, ScriptedProbe::new())
    }

    pub fn with_probe(endpoints: Vec<Endpoint>, policy: AlertPolicy, probe: ScriptedProbe) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let probe = Arc::new(probe);
        let store = Arc::new(StaticStore::new(endpoints));
        let transport = Arc::new(RecordingTransport::new());
        let engine = build_engine(&dir, probe.clone(), store.clone(), transport.clone(), policy);

        Self {
            dir,
            probe,
            store,
            transport,
            engine,
        }
    }

    /// A fresh engine sharing the state file, as after a process restart
    pub fn restart(&self, policy: AlertPolicy) -> Engine {
        build_engine(
            &self.dir,
            self.probe.clone(),
            self.store.clone(),
            self.transport.clone(),
            policy,
        )
    }

    pub fn log_text(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("uptime.log")).unwrap()
    }
}

fn build_engine(
    dir: &tempfile::TempDir,
    probe: Arc<ScriptedProbe>,
    store: Arc<StaticStore>,
    transport: Arc<RecordingTransport>,
    policy: AlertPolicy,
) -> Engine {
    Engine::new(
        store,
        probe,
        StatusSnapshot::new(),
        Arc::new(NotificationTracker::load(
            dir.path().join("notification_state.json"),
        )),
        Arc::new(LogStore::with_defaults(dir.path().join("uptime.log")).unwrap()),
    )
    .with_alerts(AlertManager::new(transport, policy))
}

pub fn policy(failure_threshold: u32, max_escalation_alerts: Option<u32>) -> AlertPolicy {
    AlertPolicy {
        failure_threshold,
        max_escalation_alerts,
    }
}
