use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Unhealthy,
}

/// Whether a failing checker should take the instance out of rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    Critical,
    Optional,
}

fn serialize_duration<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&format_args!("{:?}", duration))
}

/// Outcome of a single probe invocation.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

impl CheckResult {
    pub fn healthy(duration: Duration) -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            duration,
            timestamp: Utc::now(),
        }
    }

    pub fn unhealthy(message: String, duration: Duration) -> Self {
        Self {
            status: ComponentStatus::Unhealthy,
            message: Some(message),
            duration,
            timestamp: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == ComponentStatus::Healthy
    }
}

/// Aggregate snapshot rendered by `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: ComponentStatus,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub checks: IndexMap<String, CheckResult>,
    #[serde(serialize_with = "serialize_duration")]
    pub uptime: Duration,
}

impl HealthStatus {
    pub fn new(version: String, uptime: Duration) -> Self {
        Self {
            status: ComponentStatus::Healthy,
            timestamp: Utc::now(),
            version,
            checks: IndexMap::new(),
            uptime,
        }
    }

    /// Inserts a result, replacing any earlier one with the same name, and
    /// recomputes the aggregate status from every entry.
    pub fn add_check(&mut self, name: String, result: CheckResult) {
        self.checks.insert(name, result);
        self.status = if self.checks.values().all(CheckResult::is_healthy) {
            ComponentStatus::Healthy
        } else {
            ComponentStatus::Unhealthy
        };
    }

    pub fn is_healthy(&self) -> bool {
        self.status == ComponentStatus::Healthy
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessStatus {
    pub ready: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LivenessStatus {
    pub alive: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(serialize_with = "serialize_duration")]
    pub uptime: Duration,
}
