//! TLS certificate expiry check.
//!
//! Periodically connects to every HTTPS request target and classifies
//! the leaf certificate by time left until `notAfter`. Expired and
//! soon-to-expire certificates are reported to every channel, once per
//! change of classification.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::Url;
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use monika_config::Config;
use monika_notify::NotificationDispatcher;

use crate::error::{ProbeError, ProbeResult};

/// Connect plus handshake budget for one target.
pub const TLS_TIMEOUT: Duration = Duration::from_secs(10);

/// Warning windows in days, narrowest first.
pub const EXPIRY_WINDOWS_DAYS: [u32; 3] = [7, 14, 30];

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// How close a certificate is to its `notAfter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateStatus {
    Valid,
    /// Expires within the given number of days (one of [`EXPIRY_WINDOWS_DAYS`]).
    ExpiresWithin(u32),
    Expired,
}

impl CertificateStatus {
    /// Whether this status should reach operators.
    pub fn is_alert(&self) -> bool {
        !matches!(self, Self::Valid)
    }
}

/// Classify a certificate by its `notAfter`, both times as unix seconds.
///
/// Window bounds are inclusive: exactly seven days left is
/// `ExpiresWithin(7)`.
pub fn classify(not_after: i64, now: i64) -> CertificateStatus {
    let remaining = not_after - now;
    if remaining <= 0 {
        return CertificateStatus::Expired;
    }
    EXPIRY_WINDOWS_DAYS
        .iter()
        .find(|&&days| remaining <= i64::from(days) * SECS_PER_DAY)
        .map_or(CertificateStatus::Valid, |&days| {
            CertificateStatus::ExpiresWithin(days)
        })
}

/// An HTTPS endpoint to inspect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TlsTarget {
    pub host: String,
    pub port: u16,
}

impl TlsTarget {
    /// Extract host and port from an `https` URL.
    ///
    /// Returns `Ok(None)` for other schemes.
    pub fn from_url(raw: &str) -> ProbeResult<Option<Self>> {
        let url = Url::parse(raw).map_err(|e| ProbeError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "https" {
            return Ok(None);
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ProbeError::InvalidUrl {
                url: raw.to_string(),
                reason: "missing host".to_string(),
            })?;
        Ok(Some(Self {
            host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port: url.port().unwrap_or(443),
        }))
    }

    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Distinct HTTPS targets across all HTTP probes, in declaration order.
pub fn tls_targets(config: &Config) -> Vec<TlsTarget> {
    let mut targets: Vec<TlsTarget> = Vec::new();
    for probe in config.probes.iter().filter(|p| !p.is_icmp()) {
        for request in probe.requests() {
            match TlsTarget::from_url(&request.url) {
                Ok(Some(target)) => {
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                }
                Ok(None) => debug!(probe = %probe.name, url = %request.url, "not https, skipping"),
                Err(e) => warn!(probe = %probe.name, error = %e, "skipping certificate check"),
            }
        }
    }
    targets
}

/// Leaf certificate facts needed for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificate {
    /// `notAfter` as unix seconds.
    pub not_after_unix: i64,
    /// `notAfter` rendered for humans.
    pub not_after: String,
}

/// Fetches the leaf certificate a server presents.
#[async_trait]
pub trait CertificateInspector: Send + Sync {
    async fn inspect(&self, target: &TlsTarget) -> ProbeResult<PeerCertificate>;
}

/// [`CertificateInspector`] doing a real TLS 1.2+ handshake.
#[derive(Clone)]
pub struct TlsInspector {
    client_config: Arc<rustls::ClientConfig>,
}

impl TlsInspector {
    /// Verify against the Mozilla root store.
    ///
    /// Expiry is tolerated during the handshake so an expired certificate
    /// can still be read and reported.
    pub fn new() -> ProbeResult<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let webpki = WebPkiServerVerifier::builder_with_provider(
            Arc::new(root_store),
            Arc::clone(&provider),
        )
        .build()
        .map_err(|e| ProbeError::Tls {
            addr: String::new(),
            reason: format!("verifier setup: {e}"),
        })?;

        let config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| ProbeError::Tls {
                addr: String::new(),
                reason: format!("tls protocol version error: {e}"),
            })?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(ExpiryTolerantVerifier { inner: webpki }))
            .with_no_client_auth();

        Ok(Self {
            client_config: Arc::new(config),
        })
    }

    async fn handshake(&self, target: &TlsTarget) -> ProbeResult<Vec<u8>> {
        let addr = target.addr();
        let tls_err = |reason: String| ProbeError::Tls {
            addr: addr.clone(),
            reason,
        };

        let server_name = ServerName::try_from(target.host.clone())
            .map_err(|e| tls_err(format!("invalid server name: {e}")))?;
        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|e| tls_err(e.to_string()))?;
        let connector = tokio_rustls::TlsConnector::from(Arc::clone(&self.client_config));
        let stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| tls_err(e.to_string()))?;

        let (_, conn) = stream.get_ref();
        conn.peer_certificates()
            .and_then(|certs| certs.first())
            .map(|leaf| leaf.as_ref().to_vec())
            .ok_or_else(|| tls_err("no certificate presented".to_string()))
    }
}

#[async_trait]
impl CertificateInspector for TlsInspector {
    async fn inspect(&self, target: &TlsTarget) -> ProbeResult<PeerCertificate> {
        let der = tokio::time::timeout(TLS_TIMEOUT, self.handshake(target))
            .await
            .map_err(|_| ProbeError::Tls {
                addr: target.addr(),
                reason: format!("timed out after {}s", TLS_TIMEOUT.as_secs()),
            })??;

        let (_, cert) =
            x509_parser::parse_x509_certificate(&der).map_err(|e| ProbeError::Certificate {
                addr: target.addr(),
                reason: e.to_string(),
            })?;
        let not_after = cert.validity().not_after;
        Ok(PeerCertificate {
            not_after_unix: not_after.timestamp(),
            not_after: not_after.to_string(),
        })
    }
}

/// Standard web PKI verification that lets expired certificates through.
#[derive(Debug)]
struct ExpiryTolerantVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for ExpiryTolerantVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Err(rustls::Error::InvalidCertificate(
                CertificateError::Expired | CertificateError::ExpiredContext { .. },
            )) => Ok(ServerCertVerified::assertion()),
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Text sent for an alerting classification.
pub fn expiry_message(host: &str, status: CertificateStatus, not_after: &str) -> Option<String> {
    match status {
        CertificateStatus::Valid => None,
        CertificateStatus::Expired => Some(format!(
            "SSL certificate for {host} is expired, expired at {not_after}"
        )),
        CertificateStatus::ExpiresWithin(days) => Some(format!(
            "SSL certificate for {host} expires within {days} days, expires at {not_after}"
        )),
    }
}

/// Runs the periodic certificate check and remembers what was reported.
pub struct CertificateMonitor {
    inspector: Arc<dyn CertificateInspector>,
    dispatcher: Arc<NotificationDispatcher>,
    /// Last classification per target, to report only changes.
    last: Mutex<HashMap<TlsTarget, CertificateStatus>>,
}

impl CertificateMonitor {
    pub fn new(
        inspector: Arc<dyn CertificateInspector>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            inspector,
            dispatcher,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Inspect every HTTPS target of `config` once.
    pub async fn check(&self, config: &Config) {
        let targets = tls_targets(config);
        self.last
            .lock()
            .await
            .retain(|target, _| targets.contains(target));
        if targets.is_empty() {
            debug!("no https targets, skipping certificate check");
            return;
        }

        for target in targets {
            let cert = match self.inspector.inspect(&target).await {
                Ok(cert) => cert,
                Err(e) => {
                    warn!(host = %target.host, port = target.port, error = %e, "certificate check failed");
                    continue;
                }
            };

            let status = classify(cert.not_after_unix, unix_now());
            let previous = self.last.lock().await.insert(target.clone(), status);

            if !status.is_alert() {
                info!(host = %target.host, not_after = %cert.not_after, "certificate is valid");
                continue;
            }
            warn!(host = %target.host, ?status, not_after = %cert.not_after, "certificate needs attention");

            if previous == Some(status) {
                debug!(host = %target.host, "already reported");
                continue;
            }
            if let Some(message) = expiry_message(&target.host, status, &cert.not_after) {
                self.dispatcher
                    .broadcast(&config.notifications, &message)
                    .await;
            }
        }
    }

    /// Check every `interval` against the latest config snapshot until
    /// `shutdown` flips or its sender is dropped.
    pub async fn run(
        self,
        interval: Duration,
        config: watch::Receiver<Arc<Config>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug!(interval_secs = interval.as_secs(), "certificate check starting");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let snapshot = Arc::clone(&config.borrow());
                    self.check(&snapshot).await;
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("certificate check shutting down");
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
