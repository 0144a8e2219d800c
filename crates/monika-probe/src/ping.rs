//! ICMP echo executor.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence, SurgeError};
use tracing::debug;

use crate::error::{ProbeError, ProbeResult};

/// Upper bound on a single echo round trip.
pub const PING_TIMEOUT: Duration = Duration::from_secs(10);

const PAYLOAD: [u8; 56] = [0; 56];

static NEXT_IDENTIFIER: AtomicU16 = AtomicU16::new(0);

/// Outcome of one successful echo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingResult {
    /// Round-trip time in milliseconds.
    pub rtt_ms: f64,
}

/// Sends a single reachability probe to a host.
#[async_trait]
pub trait PingExecutor: Send + Sync {
    async fn ping(&self, target: &str) -> ProbeResult<PingResult>;
}

/// [`PingExecutor`] sending real ICMP echo requests.
///
/// Needs permission to open ICMP sockets (root, `CAP_NET_RAW`, or the
/// `net.ipv4.ping_group_range` sysctl). Without it every ping fails.
#[derive(Debug, Clone)]
pub struct IcmpPinger {
    timeout: Duration,
}

impl IcmpPinger {
    pub fn new() -> Self {
        Self {
            timeout: PING_TIMEOUT,
        }
    }

    /// Override the echo timeout (for testing).
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for IcmpPinger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PingExecutor for IcmpPinger {
    async fn ping(&self, target: &str) -> ProbeResult<PingResult> {
        let addr = resolve(target).await?;

        let config = match addr {
            IpAddr::V4(_) => Config::default(),
            IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
        };
        let client = Client::new(&config).map_err(|e| ProbeError::Ping {
            host: target.to_string(),
            reason: format!("cannot open icmp socket: {e}"),
        })?;

        let identifier = PingIdentifier(
            NEXT_IDENTIFIER
                .fetch_add(1, Ordering::Relaxed)
                .wrapping_add(std::process::id() as u16),
        );
        let mut pinger = client.pinger(addr, identifier).await;
        pinger.timeout(self.timeout);

        match pinger.ping(PingSequence(0), &PAYLOAD).await {
            Ok((_, rtt)) => {
                let rtt_ms = rtt.as_secs_f64() * 1000.0;
                debug!(%target, %addr, rtt_ms, "echo reply received");
                Ok(PingResult { rtt_ms })
            }
            Err(SurgeError::Timeout { .. }) => Err(ProbeError::PingTimeout {
                host: target.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
            Err(e) => Err(ProbeError::Ping {
                host: target.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Resolve a host name or literal address to the first IP it maps to.
async fn resolve(target: &str) -> ProbeResult<IpAddr> {
    let host = target.trim();
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let mut addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| ProbeError::Resolve {
            host: host.to_string(),
            reason: e.to_string(),
        })?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| ProbeError::Resolve {
            host: host.to_string(),
            reason: "no addresses found".to_string(),
        })
}
