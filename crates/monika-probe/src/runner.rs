//! Probe runner — the periodic check loop for a single probe.
//!
//! Each runner owns its [`HealthTracker`] and runs strictly sequential
//! cycles: sleep for the probe interval, check, feed the verdict into
//! the tracker, and notify every channel when a state boundary is
//! crossed. Notifications are awaited inline, so the next cycle never
//! starts before delivery of the previous transition finished.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use monika_config::{Alert, NotificationChannel, Probe, ProbeKind, Request};
use monika_notify::NotificationDispatcher;

use crate::condition::Condition;
use crate::http::{HttpExecutor, ReqwestExecutor};
use crate::ping::{IcmpPinger, PingExecutor};
use crate::tracker::{HealthStatus, HealthTracker, Transition};

/// A ping slower than this fails the cycle.
pub const SLOW_PING_MS: f64 = 2_000.0;

/// A ping slower than this is treated as lost.
pub const PING_LOSS_MS: f64 = 10_000.0;

/// Why a cycle failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    /// Condition (or synthetic condition) that fired.
    pub query: String,
    pub message: String,
    /// URL of the request, or host of the ping.
    pub target: String,
}

/// Result of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub failed: bool,
    /// Set exactly when `failed` is.
    pub reason: Option<FailureReason>,
}

impl Verdict {
    pub fn passed() -> Self {
        Self {
            failed: false,
            reason: None,
        }
    }

    pub fn failed(
        query: impl Into<String>,
        message: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            failed: true,
            reason: Some(FailureReason {
                query: query.into(),
                message: message.into(),
                target: target.into(),
            }),
        }
    }
}

/// What a single call to [`ProbeRunner::run_cycle`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub verdict: Verdict,
    pub transition: Option<Transition>,
}

/// Executors, dispatcher and channels shared by every runner of one
/// configuration snapshot.
#[derive(Clone)]
pub struct RunnerContext {
    pub http: Arc<dyn HttpExecutor>,
    pub pinger: Arc<dyn PingExecutor>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub channels: Arc<[NotificationChannel]>,
}

impl RunnerContext {
    /// Real network executors and the built-in senders.
    pub fn new(channels: Vec<NotificationChannel>) -> Self {
        Self {
            http: Arc::new(ReqwestExecutor::new()),
            pinger: Arc::new(IcmpPinger::new()),
            dispatcher: Arc::new(NotificationDispatcher::with_default_senders()),
            channels: channels.into(),
        }
    }

    pub fn with_http(mut self, http: Arc<dyn HttpExecutor>) -> Self {
        self.http = http;
        self
    }

    pub fn with_pinger(mut self, pinger: Arc<dyn PingExecutor>) -> Self {
        self.pinger = pinger;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<NotificationDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }
}

/// An alert with its condition compiled once up front.
struct CompiledAlert {
    alert: Alert,
    /// `None` when the query does not compile; such an alert never fires.
    condition: Option<Condition>,
}

/// Runs the check loop of one probe.
pub struct ProbeRunner {
    probe: Arc<Probe>,
    tracker: HealthTracker,
    /// Compiled alerts, indexed like the probe's requests.
    alerts: Vec<Vec<CompiledAlert>>,
    ctx: RunnerContext,
}

impl ProbeRunner {
    pub fn new(probe: Arc<Probe>, ctx: RunnerContext) -> Self {
        let alerts = probe
            .requests()
            .iter()
            .map(|request| compile_alerts(&probe, request))
            .collect();

        Self {
            tracker: HealthTracker::new(probe.thresholds()),
            probe,
            alerts,
            ctx,
        }
    }

    /// The probe this runner checks.
    pub fn probe(&self) -> &Probe {
        &self.probe
    }

    /// Current health status of the probe.
    pub fn status(&self) -> HealthStatus {
        self.tracker.status()
    }

    /// Loop until `shutdown` flips or its sender is dropped.
    ///
    /// Shutdown is observed while sleeping; a cycle in progress runs to
    /// completion first.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        debug!(probe = %self.probe.id, kind = self.probe.kind_label(), "probe loop starting");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.probe.interval) => {
                    self.run_cycle().await;
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        debug!(probe = %self.probe.id, "probe loop shutting down");
    }

    /// Run one check, update health and deliver any notification.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let verdict = match &self.probe.kind {
            ProbeKind::Http { requests } => self.check_http(requests).await,
            ProbeKind::Icmp { target } => self.check_ping(target).await,
        };

        let transition = self.tracker.record(verdict.failed);
        match transition {
            Some(transition) => self.notify(transition, &verdict).await,
            None => self.log_progress(&verdict),
        }

        CycleOutcome {
            verdict,
            transition,
        }
    }

    async fn check_http(&self, requests: &[Request]) -> Verdict {
        let status = self.tracker.status();

        for (index, request) in requests.iter().enumerate() {
            let result = match self.ctx.http.execute(request, request.timeout).await {
                Ok(result) => result,
                Err(e) => {
                    info!(
                        probe = %self.probe.name,
                        %status,
                        method = %request.method,
                        url = %request.url,
                        error = %e,
                        "request failed"
                    );
                    return Verdict::failed("request error", e.to_string(), &request.url);
                }
            };

            info!(
                probe = %self.probe.name,
                %status,
                method = %request.method,
                url = %request.url,
                code = result.status,
                latency_ms = result.response_time_ms,
                "request completed"
            );

            if result.response_time_ms > request.timeout_ms() as f64 {
                return Verdict::failed(
                    format!("response.time > {}", request.timeout_ms()),
                    "Request timed out",
                    &request.url,
                );
            }

            let ctx = result.context();
            let fired = self.alerts[index].iter().find(|compiled| {
                compiled
                    .condition
                    .as_ref()
                    .is_some_and(|condition| condition.matches(&ctx))
            });
            if let Some(compiled) = fired {
                return Verdict::failed(
                    &compiled.alert.query,
                    &compiled.alert.message,
                    &request.url,
                );
            }
        }

        Verdict::passed()
    }

    async fn check_ping(&self, target: &str) -> Verdict {
        let status = self.tracker.status();

        match self.ctx.pinger.ping(target).await {
            Err(e) => {
                info!(probe = %self.probe.name, %status, %target, error = %e, "ping failed");
                Verdict::failed("ping error", e.to_string(), target)
            }
            Ok(result) => {
                info!(
                    probe = %self.probe.name,
                    %status,
                    %target,
                    latency_ms = result.rtt_ms,
                    "ping completed"
                );
                if result.rtt_ms > PING_LOSS_MS {
                    Verdict::failed(
                        format!("response.time > {PING_LOSS_MS}"),
                        "Ping timed out",
                        target,
                    )
                } else if result.rtt_ms > SLOW_PING_MS {
                    Verdict::failed(
                        format!("response.time > {SLOW_PING_MS}"),
                        "Ping response time is greater than 2 seconds",
                        target,
                    )
                } else {
                    Verdict::passed()
                }
            }
        }
    }

    async fn notify(&self, transition: Transition, verdict: &Verdict) {
        let message = match transition {
            Transition::Incident => incident_message(&self.probe, verdict.reason.as_ref()),
            Transition::Recovered => {
                recovery_message(&self.probe, self.tracker.recovery_threshold())
            }
        };

        info!(
            probe = %self.probe.name,
            kind = self.probe.kind_label(),
            status = %self.tracker.status(),
            channels = self.ctx.channels.len(),
            "health changed, notifying channels"
        );
        self.ctx
            .dispatcher
            .broadcast(&self.ctx.channels, &message)
            .await;
    }

    fn log_progress(&self, verdict: &Verdict) {
        match (self.tracker.status(), &verdict.reason) {
            (HealthStatus::Healthy, Some(reason)) => info!(
                probe = %self.probe.name,
                reason = %reason.message,
                attempt = self.tracker.incident_count(),
                of = self.probe.thresholds().incident,
                "alert detected, not yet an incident"
            ),
            (HealthStatus::Incident, None) => info!(
                probe = %self.probe.name,
                attempt = self.tracker.recovery_count(),
                of = self.tracker.recovery_threshold(),
                "checks passing, not yet recovered"
            ),
            _ => {}
        }
    }
}

fn compile_alerts(probe: &Probe, request: &Request) -> Vec<CompiledAlert> {
    request
        .alerts
        .iter()
        .map(|alert| {
            let condition = match Condition::compile(&alert.query) {
                Ok(condition) => Some(condition),
                Err(e) => {
                    warn!(
                        probe = %probe.id,
                        url = %request.url,
                        query = %alert.query,
                        error = %e,
                        "alert query does not compile, it will never fire"
                    );
                    None
                }
            };
            CompiledAlert {
                alert: alert.clone(),
                condition,
            }
        })
        .collect()
}

/// Text sent when a probe enters an incident.
pub fn incident_message(probe: &Probe, reason: Option<&FailureReason>) -> String {
    match &probe.kind {
        ProbeKind::Http { .. } => {
            let (query, message, url) = reason
                .map(|r| (r.query.as_str(), r.message.as_str(), r.target.as_str()))
                .unwrap_or_default();
            format!(
                "Probe is now in an incident state\n\n\
                 Probe: {}\n\
                 Alert: {query}\n\
                 Message: {message}\n\
                 URL: {url}",
                probe.name
            )
        }
        ProbeKind::Icmp { target } => {
            let mut text = format!(
                "Probe {} is now in an incident state\n\nTarget: {target}",
                probe.name
            );
            if let Some(reason) = reason {
                text.push_str("\nMessage: ");
                text.push_str(&reason.message);
            }
            text
        }
    }
}

/// Text sent when a probe recovers after `passes` consecutive passing cycles.
pub fn recovery_message(probe: &Probe, passes: u32) -> String {
    match &probe.kind {
        ProbeKind::Http { .. } => format!(
            "Probe is now in a healthy state\n\n\
             Probe: {}\n\
             All checks passed successfully for {passes} consecutive attempts",
            probe.name
        ),
        ProbeKind::Icmp { target } => format!(
            "Probe {} is now in a healthy state\n\nTarget: {target}",
            probe.name
        ),
    }
}
