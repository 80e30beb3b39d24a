//! Dedicated TLS handshake probe
//!
//! Opens its own TCP connection, performs a verified handshake (hostname and
//! certificate chain against the webpki root set) and reports the result as a
//! separate signal from the HTTP check.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::trace;

use super::probe::SslStatus;

const HTTPS_DEFAULT_PORT: u16 = 443;

#[derive(Debug, Error)]
enum HandshakeError {
    #[error("url has no host")]
    MissingHost,

    #[error("invalid server name: {0}")]
    InvalidName(#[from] rustls::pki_types::InvalidDnsNameError),

    #[error("tls connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("tls handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    #[error("tls handshake timed out")]
    TimedOut,
}

/// Result of a TLS handshake probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsCheck {
    pub status: SslStatus,
    pub error: Option<String>,
}

impl TlsCheck {
    fn not_applicable() -> Self {
        Self {
            status: SslStatus::NotApplicable,
            error: None,
        }
    }

    /// Handshake not attempted because shutdown was requested
    pub fn skipped() -> Self {
        Self {
            status: SslStatus::NotApplicable,
            error: Some("tls handshake skipped: shutting down".to_string()),
        }
    }
}

pub struct TlsProbe {
    connector: TlsConnector,
    timeout: Duration,
}

impl TlsProbe {
    pub fn new(timeout: Duration) -> Result<Self, rustls::Error> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            timeout,
        })
    }

    /// Handshake against the endpoint; non-`https` urls are not applicable
    pub async fn check(&self, url: &str) -> TlsCheck {
        let Ok(parsed) = Url::parse(url) else {
            return TlsCheck::not_applicable();
        };
        if parsed.scheme() != "https" {
            return TlsCheck::not_applicable();
        }

        let handshake = tokio::time::timeout(self.timeout, self.handshake(&parsed))
            .await
            .unwrap_or(Err(HandshakeError::TimedOut));

        match handshake {
            Ok(()) => TlsCheck {
                status: SslStatus::Up,
                error: None,
            },
            Err(e) => {
                trace!("tls probe for {url} failed: {e}");
                TlsCheck {
                    status: SslStatus::Down,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn handshake(&self, url: &Url) -> Result<(), HandshakeError> {
        let host = url
            .host_str()
            .map(|host| host.trim_start_matches('[').trim_end_matches(']'))
            .filter(|host| !host.is_empty())
            .ok_or(HandshakeError::MissingHost)?;
        let port = url.port().unwrap_or(HTTPS_DEFAULT_PORT);

        let server_name = ServerName::try_from(host.to_string())?;
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(HandshakeError::Connect)?;

        self.connector
            .connect(server_name, stream)
            .await
            .map_err(HandshakeError::Handshake)?;

        Ok(())
    }
}
