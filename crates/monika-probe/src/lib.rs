//! monika-probe — checking endpoints and tracking their health.
//!
//! # Architecture
//!
//! ```text
//! ProbeSupervisor
//!   └── One task per probe (ProbeRunner)
//!       ├── HttpExecutor / PingExecutor → verdict
//!       ├── Condition (alert queries over the response)
//!       ├── HealthTracker (consecutive verdicts → transition)
//!       └── NotificationDispatcher on every transition
//!
//! CertificateMonitor
//!   └── Periodic TLS handshake per HTTPS target → expiry alerts
//! ```
//!
//! A probe starts healthy. It enters an incident after
//! `incident_threshold` consecutive failing cycles and recovers after
//! `recovery_threshold` consecutive passing ones. Each crossing is
//! reported once to every configured channel.

pub mod certificate;
pub mod condition;
pub mod error;
pub mod http;
pub mod ping;
pub mod runner;
pub mod supervisor;
pub mod tracker;

pub use certificate::{CertificateMonitor, CertificateStatus, TlsInspector};
pub use condition::{Condition, ConditionError, ResponseContext, evaluate};
pub use error::{ProbeError, ProbeResult};
pub use http::{HttpExecutor, HttpResult, ReqwestExecutor};
pub use ping::{IcmpPinger, PingExecutor, PingResult};
pub use runner::{CycleOutcome, FailureReason, ProbeRunner, RunnerContext, Verdict};
pub use supervisor::ProbeSupervisor;
pub use tracker::{HealthStatus, HealthTracker, Transition};
