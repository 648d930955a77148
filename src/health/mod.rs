mod checks;
mod metrics;
mod models;
mod service;

pub use checks::{Checker, FnChecker, Ping, PingChecker, ProbeError, PROBE_TIMEOUT};
pub use metrics::Metrics;
pub use models::{
    CheckResult, ComponentStatus, Criticality, HealthStatus, LivenessStatus, ReadinessStatus,
};
pub use service::HealthService;
