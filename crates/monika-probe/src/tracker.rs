//! Debounced health state for one probe.
//!
//! A probe flips to [`HealthStatus::Incident`] only after a run of
//! consecutive failing cycles, and back to [`HealthStatus::Healthy`]
//! only after a run of consecutive passing ones. Any opposite verdict
//! resets the run.

use std::fmt;

use tracing::{debug, info, warn};

use monika_config::Thresholds;

/// Current health of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthStatus {
    #[default]
    Healthy,
    Incident,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Incident => write!(f, "incident"),
        }
    }
}

/// A state boundary crossed by a single cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Healthy → Incident.
    Incident,
    /// Incident → Healthy.
    Recovered,
}

/// Tracks consecutive cycle verdicts for a single probe.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    status: HealthStatus,
    /// Consecutive failing cycles.
    incident_count: u32,
    /// Consecutive passing cycles.
    recovery_count: u32,
    incident_threshold: u32,
    recovery_threshold: u32,
}

impl HealthTracker {
    /// A healthy tracker with zeroed counters.
    pub fn new(thresholds: Thresholds) -> Self {
        Self::with_thresholds(thresholds.incident, thresholds.recovery)
    }

    /// Shorthand for [`HealthTracker::new`] with explicit thresholds.
    pub fn with_thresholds(incident_threshold: u32, recovery_threshold: u32) -> Self {
        Self {
            status: HealthStatus::Healthy,
            incident_count: 0,
            recovery_count: 0,
            incident_threshold,
            recovery_threshold,
        }
    }

    /// Record one cycle verdict. Returns the transition it caused, if any.
    pub fn record(&mut self, failed: bool) -> Option<Transition> {
        if failed {
            self.recovery_count = 0;
            self.incident_count = self.incident_count.saturating_add(1);

            if self.status == HealthStatus::Healthy {
                if self.incident_count >= self.incident_threshold {
                    warn!(
                        failures = self.incident_count,
                        threshold = self.incident_threshold,
                        "probe entered incident"
                    );
                    self.status = HealthStatus::Incident;
                    return Some(Transition::Incident);
                }
                debug!(
                    failures = self.incident_count,
                    threshold = self.incident_threshold,
                    "failing, not yet in incident"
                );
            }
        } else {
            self.incident_count = 0;
            self.recovery_count = self.recovery_count.saturating_add(1);

            if self.status == HealthStatus::Incident {
                if self.recovery_count >= self.recovery_threshold {
                    info!(
                        successes = self.recovery_count,
                        threshold = self.recovery_threshold,
                        "probe recovered"
                    );
                    self.status = HealthStatus::Healthy;
                    return Some(Transition::Recovered);
                }
                debug!(
                    successes = self.recovery_count,
                    threshold = self.recovery_threshold,
                    "passing, not yet recovered"
                );
            }
        }

        None
    }

    /// Current health status.
    pub fn status(&self) -> HealthStatus {
        self.status
    }

    /// Consecutive failing cycles counted toward an incident.
    pub fn incident_count(&self) -> u32 {
        self.incident_count
    }

    /// Consecutive passing cycles counted toward recovery.
    pub fn recovery_count(&self) -> u32 {
        self.recovery_count
    }

    /// Passing cycles needed to leave an incident.
    pub fn recovery_threshold(&self) -> u32 {
        self.recovery_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(tracker: &mut HealthTracker, verdicts: &[bool]) -> Vec<Option<Transition>> {
        verdicts.iter().map(|&failed| tracker.record(failed)).collect()
    }

    #[test]
    fn starts_healthy() {
        let tracker = HealthTracker::with_thresholds(3, 3);
        assert_eq!(tracker.status(), HealthStatus::Healthy);
        assert_eq!(tracker.incident_count(), 0);
        assert_eq!(tracker.recovery_count(), 0);
    }

    #[test]
    fn incident_after_threshold_failures() {
        let mut tracker = HealthTracker::with_thresholds(3, 3);
        let out = feed(&mut tracker, &[true, true, true]);
        assert_eq!(out, vec![None, None, Some(Transition::Incident)]);
        assert_eq!(tracker.status(), HealthStatus::Incident);
    }

    #[test]
    fn recovery_needs_consecutive_passes() {
        let mut tracker = HealthTracker::with_thresholds(5, 5);
        feed(&mut tracker, &[true; 5]);
        assert_eq!(tracker.status(), HealthStatus::Incident);

        // Four passes, then a failure resets the run.
        let out = feed(&mut tracker, &[false, false, false, false, true]);
        assert!(out.iter().all(Option::is_none));
        assert_eq!(tracker.recovery_count(), 0);
        assert_eq!(tracker.status(), HealthStatus::Incident);

        let out = feed(&mut tracker, &[false; 5]);
        assert_eq!(out[4], Some(Transition::Recovered));
        assert!(out[..4].iter().all(Option::is_none));
        assert_eq!(tracker.status(), HealthStatus::Healthy);
    }

    #[test]
    fn isolated_failure_does_not_count_toward_run() {
        let mut tracker = HealthTracker::with_thresholds(3, 3);
        let out = feed(&mut tracker, &[true, false, true, true]);
        assert!(out.iter().all(Option::is_none));
        assert_eq!(tracker.status(), HealthStatus::Healthy);
        assert_eq!(tracker.incident_count(), 2);

        assert_eq!(tracker.record(true), Some(Transition::Incident));
    }

    #[test]
    fn staying_in_incident_emits_once() {
        let mut tracker = HealthTracker::with_thresholds(3, 3);
        let out = feed(&mut tracker, &[true; 10]);
        let emitted = out.iter().filter(|t| t.is_some()).count();
        assert_eq!(emitted, 1);
        assert_eq!(tracker.incident_count(), 10);
    }

    #[test]
    fn passing_while_healthy_is_quiet() {
        let mut tracker = HealthTracker::with_thresholds(1, 1);
        assert!(feed(&mut tracker, &[false; 4]).iter().all(Option::is_none));
        assert_eq!(tracker.recovery_count(), 4);
    }

    #[test]
    fn built_from_probe_thresholds() {
        let mut tracker = HealthTracker::new(Thresholds {
            incident: 2,
            recovery: 1,
        });
        assert_eq!(tracker.recovery_threshold(), 1);
        assert_eq!(tracker.record(true), None);
        assert_eq!(tracker.record(true), Some(Transition::Incident));
        assert_eq!(tracker.record(false), Some(Transition::Recovered));
    }

    #[test]
    fn status_display() {
        assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
        assert_eq!(HealthStatus::Incident.to_string(), "incident");
    }
}
