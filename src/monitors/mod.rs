//! Availability probes
//!
//! - [`probe`]: HTTP check and classification, the [`Probe`](probe::Probe) seam
//! - [`tls`]: dedicated TLS handshake check for `https` endpoints

pub mod probe;
pub mod tls;
