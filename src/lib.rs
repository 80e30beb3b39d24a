//! Uptime monitoring engine
//!
//! Periodically probes HTTP(S) endpoints, keeps the latest result per
//! endpoint, decides when an outage or a recovery is worth an alert and keeps
//! a bounded, retained log of every check.

pub mod actors;
pub mod alerts;
pub mod app;
pub mod config;
pub mod console;
pub mod endpoints;
pub mod engine;
pub mod error;
pub mod logs;
pub mod monitors;
pub mod notification;
pub mod snapshot;
pub mod telegram;
pub mod util;

pub use app::App;
pub use endpoints::Endpoint;
pub use engine::{CycleReport, Engine};
pub use monitors::probe::{Outcome, ProbeResult};
