//! Resolved configuration types.
//!
//! Everything here is immutable once built by [`crate::Config`]. Probe
//! runners share these read-only behind an `Arc`.

use std::time::Duration;

/// Unique identifier for a probe.
pub type ProbeId = String;

/// Default check interval when a probe omits `interval`.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Default per-request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default incident and recovery threshold for HTTP requests.
pub const DEFAULT_THRESHOLD: u32 = 5;

/// Incident and recovery threshold used for every ICMP probe.
pub const PING_THRESHOLD: u32 = 5;

/// Default HTTP method.
pub const DEFAULT_METHOD: &str = "GET";

// ── Probe ──────────────────────────────────────────────────────────

/// A periodically executed check against one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub id: ProbeId,
    pub name: String,
    /// Time between two consecutive cycles.
    pub interval: Duration,
    pub kind: ProbeKind,
}

/// What a probe checks. Exactly one payload exists per probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeKind {
    /// Ordered HTTP requests, evaluated in declaration order.
    Http { requests: Vec<Request> },
    /// A single host reached with ICMP echo.
    Icmp { target: String },
}

impl Probe {
    /// Short label used in log lines: `"http"` or `"ping"`.
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            ProbeKind::Http { .. } => "http",
            ProbeKind::Icmp { .. } => "ping",
        }
    }

    pub fn is_icmp(&self) -> bool {
        matches!(self.kind, ProbeKind::Icmp { .. })
    }

    /// HTTP requests of this probe, empty for ICMP probes.
    pub fn requests(&self) -> &[Request] {
        match &self.kind {
            ProbeKind::Http { requests } => requests,
            ProbeKind::Icmp { .. } => &[],
        }
    }

    /// Incident and recovery thresholds for this probe.
    ///
    /// HTTP probes take the largest value across their requests; ICMP
    /// probes always use [`PING_THRESHOLD`].
    pub fn thresholds(&self) -> Thresholds {
        match &self.kind {
            ProbeKind::Http { requests } => Thresholds {
                incident: requests
                    .iter()
                    .map(|r| r.incident_threshold)
                    .max()
                    .unwrap_or(DEFAULT_THRESHOLD),
                recovery: requests
                    .iter()
                    .map(|r| r.recovery_threshold)
                    .max()
                    .unwrap_or(DEFAULT_THRESHOLD),
            },
            ProbeKind::Icmp { .. } => Thresholds {
                incident: PING_THRESHOLD,
                recovery: PING_THRESHOLD,
            },
        }
    }
}

/// Consecutive-verdict counts needed to cross a health state boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub incident: u32,
    pub recovery: u32,
}

/// One HTTP call made during an HTTP probe cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub method: String,
    pub timeout: Duration,
    pub recovery_threshold: u32,
    pub incident_threshold: u32,
    pub alerts: Vec<Alert>,
}

impl Request {
    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

/// A boolean condition over a response, plus the text sent when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub query: String,
    pub message: String,
}

impl Alert {
    pub fn new(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            message: message.into(),
        }
    }

    /// Alerts applied to a request that declares none.
    pub fn default_set() -> Vec<Alert> {
        vec![
            Alert::new(
                "response.status < 200 || response.status >= 300",
                "Response status is not between 200 and 300",
            ),
            Alert::new(
                "response.time > 2000",
                "Response time is greater than 2 seconds",
            ),
        ]
    }
}

// ── Notifications ─────────────────────────────────────────────────

/// A destination for transition messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub id: String,
    pub kind: ChannelKind,
}

impl NotificationChannel {
    /// The `type` string this channel was declared with.
    pub fn type_name(&self) -> &str {
        match &self.kind {
            ChannelKind::Discord { .. } => "discord",
            ChannelKind::Smtp(_) => "smtp",
            ChannelKind::Unknown { type_name } => type_name,
        }
    }
}

/// Channel settings, one variant per supported `type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelKind {
    /// Chat webhook receiving a JSON `{"content": ...}` post.
    Discord { url: String },
    /// Mail submission.
    Smtp(SmtpSettings),
    /// A `type` this build has no sender for. Kept so fan-out can skip it.
    Unknown { type_name: String },
}

/// SMTP submission settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmtpSettings {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub recipients: Vec<String>,
}

impl SmtpSettings {
    /// Host, port, and at least one recipient are present.
    pub fn is_complete(&self) -> bool {
        !self.hostname.is_empty() && self.port > 0 && !self.recipients.is_empty()
    }
}
