//! Live configuration reload.
//!
//! Watches the directory holding the configuration file and, when the
//! file is written or recreated, loads it again. A snapshot that fails
//! to load is rejected and the running probes keep their old settings.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use monika_config::Config;
use monika_notify::NotificationDispatcher;
use monika_probe::ProbeSupervisor;

/// Quiet period collapsing a burst of file events into one reload.
const DEBOUNCE: Duration = Duration::from_millis(250);

pub struct ConfigReloader {
    path: PathBuf,
    supervisor: Arc<ProbeSupervisor>,
    dispatcher: Arc<NotificationDispatcher>,
    snapshot: watch::Sender<Arc<Config>>,
    events: mpsc::Receiver<()>,
    /// Dropping the watcher stops event delivery.
    _watcher: RecommendedWatcher,
}

impl ConfigReloader {
    pub fn new(
        path: PathBuf,
        supervisor: Arc<ProbeSupervisor>,
        dispatcher: Arc<NotificationDispatcher>,
        snapshot: watch::Sender<Arc<Config>>,
    ) -> notify::Result<Self> {
        let (tx, events) = mpsc::channel(16);
        let target = path.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) if is_relevant(&event, &target) => {
                    // A full queue already holds a pending reload.
                    let _ = tx.try_send(());
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "config watcher error"),
            }
        })?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!(path = %path.display(), "watching configuration file");

        Ok(Self {
            path,
            supervisor,
            dispatcher,
            snapshot,
            events,
            _watcher: watcher,
        })
    }

    /// Reload on every change until `shutdown` flips.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                Some(()) = self.events.recv() => {
                    tokio::time::sleep(DEBOUNCE).await;
                    while self.events.try_recv().is_ok() {}
                    self.reload().await;
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("config watcher shutting down");
    }

    /// Load the file again and swap it in. Returns whether the new
    /// snapshot was applied.
    pub async fn reload(&self) -> bool {
        info!(path = %self.path.display(), "configuration changed, reloading");

        let config = match Config::from_file(&self.path) {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "invalid configuration, keeping the running one"
                );
                return false;
            }
        };

        info!(
            probes = config.probes.len(),
            notifications = config.notifications.len(),
            "configuration reloaded"
        );
        crate::announce(&self.dispatcher, &config).await;
        self.supervisor.restart(&config).await;
        self.snapshot.send_replace(Arc::new(config));
        true
    }
}

/// A create or modify event touching the watched file.
fn is_relevant(event: &Event, target: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == target.file_name())
}
