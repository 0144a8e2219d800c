//! Probe supervisor — spawns and stops one runner task per probe.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use monika_config::{Config, ProbeId};

use crate::runner::{ProbeRunner, RunnerContext};

/// How long [`ProbeSupervisor::stop_all`] waits for a runner to finish
/// its current cycle before aborting it.
pub const STOP_GRACE: Duration = Duration::from_secs(15);

/// Per-probe runner state.
struct RunnerSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Owns the runner tasks of the current configuration snapshot.
pub struct ProbeSupervisor {
    template: RunnerContext,
    /// Active runners in start order. Ids are not assumed unique: a
    /// snapshot built in code may repeat one, and every probe still runs.
    runners: Arc<RwLock<Vec<(ProbeId, RunnerSlot)>>>,
}

impl ProbeSupervisor {
    /// `template` provides the executors and dispatcher; its channels are
    /// replaced by the notifications of each started snapshot.
    pub fn new(template: RunnerContext) -> Self {
        Self {
            template,
            runners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Spawn a runner for every probe in `config`, alongside any runners
    /// already active.
    pub async fn start(&self, config: &Config) {
        let channels: Arc<[_]> = config.notifications.clone().into();
        let ctx = RunnerContext {
            channels,
            ..self.template.clone()
        };

        let (icmp, http): (Vec<_>, Vec<_>) =
            config.probes.iter().partition(|probe| probe.is_icmp());

        let (http_count, icmp_count) = (http.len(), icmp.len());

        let mut runners = self.runners.write().await;
        for probe in http.into_iter().chain(icmp) {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let runner = ProbeRunner::new(Arc::new(probe.clone()), ctx.clone());
            let handle = tokio::spawn(runner.run(shutdown_rx));

            if runners.iter().any(|(id, _)| *id == probe.id) {
                warn!(probe = %probe.id, "duplicate probe id, both probes will run");
            }
            runners.push((
                probe.id.clone(),
                RunnerSlot {
                    handle,
                    shutdown_tx,
                },
            ));

            debug!(
                probe = %probe.id,
                kind = probe.kind_label(),
                interval_secs = probe.interval.as_secs(),
                "probe started"
            );
        }

        info!(
            http = http_count,
            icmp = icmp_count,
            "probes started"
        );
    }

    /// Signal every runner and wait for it to finish.
    pub async fn stop_all(&self) {
        let slots: Vec<_> = self.runners.write().await.drain(..).collect();

        for (_, slot) in &slots {
            let _ = slot.shutdown_tx.send(true);
        }

        for (id, mut slot) in slots {
            match tokio::time::timeout(STOP_GRACE, &mut slot.handle).await {
                Ok(Ok(())) => debug!(probe = %id, "probe stopped"),
                Ok(Err(e)) => warn!(probe = %id, error = %e, "probe task ended abnormally"),
                Err(_) => {
                    warn!(probe = %id, "probe did not stop in time, aborting");
                    slot.handle.abort();
                }
            }
        }

        info!("all probes stopped");
    }

    /// Stop everything, then start `config`.
    pub async fn restart(&self, config: &Config) {
        self.stop_all().await;
        self.start(config).await;
    }

    /// Ids of probes with a running task, sorted. A repeated id appears
    /// once per runner.
    pub async fn active_probes(&self) -> Vec<ProbeId> {
        let runners = self.runners.read().await;
        let mut ids: Vec<_> = runners.iter().map(|(id, _)| id.clone()).collect();
        ids.sort();
        ids
    }

    /// Whether at least one runner is active for `probe_id`.
    pub async fn is_running(&self, probe_id: &str) -> bool {
        self.runners
            .read()
            .await
            .iter()
            .any(|(id, _)| id == probe_id)
    }
}
