use super::models::CheckResult;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),
    #[error("{0}")]
    Failed(String),
}

/// Probes one dependency.
///
/// Implementations must not panic when the dependency fails: errors are
/// reported as an unhealthy [`CheckResult`]. When `deadline` is set the probe
/// has to give up once it passes.
#[async_trait]
pub trait Checker: Send + Sync {
    fn name(&self) -> &str;
    async fn check_health(&self, deadline: Option<Instant>) -> CheckResult;
}

/// Narrow liveness capability exposed by infrastructure code (database pools,
/// caches, brokers).
#[async_trait]
pub trait Ping: Send + Sync {
    async fn ping(&self) -> anyhow::Result<()>;
}

/// Runs `probe` until it finishes or `deadline` passes and converts the
/// outcome into a [`CheckResult`].
async fn run_probe<F>(name: &str, deadline: Option<Instant>, probe: F) -> CheckResult
where
    F: Future<Output = Result<(), ProbeError>>,
{
    let start = Instant::now();
    let outcome = match deadline {
        Some(deadline) => timeout_at(deadline, probe).await.unwrap_or_else(|_| {
            Err(ProbeError::DeadlineExceeded(
                deadline.saturating_duration_since(start),
            ))
        }),
        None => probe.await,
    };
    let elapsed = start.elapsed();

    match outcome {
        Ok(()) => CheckResult::healthy(elapsed),
        Err(err) => {
            tracing::warn!(checker = %name, error = %err, "Health check failed");
            CheckResult::unhealthy(err.to_string(), elapsed)
        }
    }
}

type ProbeFn = dyn Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync;

/// Checker backed by an async closure; `Ok` is healthy, `Err` carries the
/// message of an unhealthy result.
pub struct FnChecker {
    name: String,
    probe: Box<ProbeFn>,
}

impl FnChecker {
    pub fn new<F, Fut, E>(name: impl Into<String>, probe: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display,
    {
        Self {
            name: name.into(),
            probe: Box::new(move || {
                let fut = probe();
                Box::pin(async move { fut.await.map_err(|err| err.to_string()) })
            }),
        }
    }
}

#[async_trait]
impl Checker for FnChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_health(&self, deadline: Option<Instant>) -> CheckResult {
        let probe = (self.probe)();
        run_probe(&self.name, deadline, async move {
            probe.await.map_err(ProbeError::Failed)
        })
        .await
    }
}

/// Checker delegating to a [`Ping`] capability, bounded by a per-probe
/// timeout regardless of the caller's deadline.
pub struct PingChecker<P> {
    name: String,
    pinger: P,
    timeout: Duration,
}

impl<P: Ping> PingChecker<P> {
    pub fn new(name: impl Into<String>, pinger: P) -> Self {
        Self {
            name: name.into(),
            pinger,
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl<P: Ping> Checker for PingChecker<P> {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(name = "Ping dependency", skip(self), fields(checker = %self.name))]
    async fn check_health(&self, deadline: Option<Instant>) -> CheckResult {
        let bound = Instant::now() + self.timeout;
        let deadline = deadline.map_or(bound, |deadline| deadline.min(bound));

        run_probe(&self.name, Some(deadline), async {
            self.pinger
                .ping()
                .await
                .map_err(|err| ProbeError::Failed(format!("{:#}", err)))
        })
        .await
    }
}
