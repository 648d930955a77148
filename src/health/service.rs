use super::checks::Checker;
use super::models::{CheckResult, Criticality, HealthStatus, LivenessStatus, ReadinessStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

pub const READINESS_TIMEOUT: Duration = Duration::from_secs(3);

struct Registration {
    checker: Arc<dyn Checker>,
    criticality: Criticality,
}

/// Aggregates the registered dependency checkers into health, readiness and
/// liveness reports.
///
/// Checkers run one after another in registration order, so the worst-case
/// latency of a report is the sum of every checker's timeout.
pub struct HealthService {
    version: String,
    start_time: Instant,
    readiness_timeout: Duration,
    checkers: RwLock<Vec<Registration>>,
}

impl HealthService {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            start_time: Instant::now(),
            readiness_timeout: READINESS_TIMEOUT,
            checkers: RwLock::new(Vec::new()),
        }
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Budget for a whole readiness report, shared by all checkers.
    pub fn readiness_timeout(&self) -> Duration {
        self.readiness_timeout
    }

    pub async fn add_checker(&self, checker: Arc<dyn Checker>, criticality: Criticality) {
        tracing::info!(checker = %checker.name(), ?criticality, "Registering health checker");
        self.checkers.write().await.push(Registration {
            checker,
            criticality,
        });
    }

    async fn run_checks(&self, deadline: Option<Instant>) -> (HealthStatus, bool) {
        // Snapshot the list so registration never waits on a slow probe.
        let registrations: Vec<(Arc<dyn Checker>, Criticality)> = self
            .checkers
            .read()
            .await
            .iter()
            .map(|r| (r.checker.clone(), r.criticality))
            .collect();

        let mut status = HealthStatus::new(self.version.clone(), self.start_time.elapsed());
        let mut criticalities: HashMap<String, Criticality> = HashMap::new();

        for (checker, criticality) in registrations {
            let result: CheckResult = checker.check_health(deadline).await;
            criticalities.insert(checker.name().to_string(), criticality);
            status.add_check(checker.name().to_string(), result);
        }

        let ready = status.checks.iter().all(|(name, result)| {
            result.is_healthy() || criticalities.get(name) != Some(&Criticality::Critical)
        });

        status.timestamp = Utc::now();
        status.uptime = self.start_time.elapsed();

        if !status.is_healthy() {
            let failed: Vec<&str> = status
                .checks
                .iter()
                .filter(|(_, result)| !result.is_healthy())
                .map(|(name, _)| name.as_str())
                .collect();
            tracing::warn!(?failed, "Service is unhealthy");
        }

        (status, ready)
    }

    #[tracing::instrument(name = "Check service health", skip(self))]
    pub async fn check_health(&self, deadline: Option<Instant>) -> HealthStatus {
        self.run_checks(deadline).await.0
    }

    /// The instance is ready unless a checker registered as
    /// [`Criticality::Critical`] reports unhealthy.
    #[tracing::instrument(name = "Check service readiness", skip(self))]
    pub async fn readiness(&self, deadline: Option<Instant>) -> ReadinessStatus {
        let (_, ready) = self.run_checks(deadline).await;
        ReadinessStatus {
            ready,
            timestamp: Utc::now(),
        }
    }

    /// Never consults a checker: a dependency outage must not get the process
    /// restarted.
    pub fn liveness(&self) -> LivenessStatus {
        LivenessStatus {
            alive: true,
            timestamp: Utc::now(),
            uptime: self.start_time.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{ComponentStatus, FnChecker};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn healthy(name: &str) -> Arc<dyn Checker> {
        Arc::new(FnChecker::new(name, || async { Ok::<_, String>(()) }))
    }

    fn failing(name: &str, message: &'static str) -> Arc<dyn Checker> {
        Arc::new(FnChecker::new(name, move || async move { Err::<(), _>(message) }))
    }

    #[tokio::test]
    async fn empty_service_is_healthy_and_ready() {
        let service = HealthService::new("1.2.3");

        let status = service.check_health(None).await;
        assert_eq!(status.status, ComponentStatus::Healthy);
        assert_eq!(status.version, "1.2.3");
        assert!(status.checks.is_empty());
        assert!(service.readiness(None).await.ready);
    }

    #[tokio::test]
    async fn one_failing_checker_makes_the_service_unhealthy() {
        let service = HealthService::new("1.0.0");
        service.add_checker(healthy("db"), Criticality::Critical).await;
        service
            .add_checker(failing("cache", "timeout"), Criticality::Optional)
            .await;

        let status = service.check_health(None).await;
        assert_eq!(status.status, ComponentStatus::Unhealthy);
        assert_eq!(status.checks["db"].status, ComponentStatus::Healthy);
        assert_eq!(status.checks["cache"].status, ComponentStatus::Unhealthy);
        assert_eq!(status.checks["cache"].message.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn checks_are_reported_in_registration_order() {
        let service = HealthService::new("1.0.0");
        for name in ["postgresql", "redis", "mailer"] {
            service.add_checker(healthy(name), Criticality::Optional).await;
        }

        let status = service.check_health(None).await;
        let names: Vec<&str> = status.checks.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["postgresql", "redis", "mailer"]);
    }

    #[tokio::test]
    async fn later_registration_with_same_name_wins() {
        let service = HealthService::new("1.0.0");
        service
            .add_checker(failing("db", "down"), Criticality::Optional)
            .await;
        service.add_checker(healthy("db"), Criticality::Optional).await;

        let status = service.check_health(None).await;
        assert_eq!(status.checks.len(), 1);
        assert_eq!(status.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn optional_failure_keeps_the_service_ready() {
        let service = HealthService::new("1.0.0");
        service.add_checker(healthy("mongodb"), Criticality::Critical).await;
        service
            .add_checker(failing("exchange-rates", "503"), Criticality::Optional)
            .await;

        assert!(service.readiness(None).await.ready);
        assert!(!service.check_health(None).await.is_healthy());
    }

    #[tokio::test]
    async fn critical_failure_makes_the_service_unready() {
        let service = HealthService::new("1.0.0");
        service
            .add_checker(failing("mongodb", "no reachable servers"), Criticality::Critical)
            .await;
        service.add_checker(healthy("cache"), Criticality::Optional).await;

        assert!(!service.readiness(None).await.ready);
    }

    #[tokio::test]
    async fn liveness_ignores_checkers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let service = HealthService::new("1.0.0");
        service
            .add_checker(
                Arc::new(FnChecker::new("db", move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>("down") }
                })),
                Criticality::Critical,
            )
            .await;

        let live = service.liveness();
        assert!(live.alive);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn deadline_bounds_the_whole_report() {
        let service = HealthService::new("1.0.0");
        service
            .add_checker(
                Arc::new(FnChecker::new("slow", || async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok::<_, String>(())
                })),
                Criticality::Critical,
            )
            .await;

        let started = Instant::now();
        let ready = service
            .readiness(Some(Instant::now() + Duration::from_millis(50)))
            .await;
        assert!(!ready.ready);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reports_are_independent() {
        let service = Arc::new(HealthService::new("1.0.0"));
        for i in 0..5 {
            let name = format!("dep-{}", i);
            service
                .add_checker(
                    Arc::new(FnChecker::new(name, || async {
                        tokio::task::yield_now().await;
                        Ok::<_, String>(())
                    })),
                    Criticality::Optional,
                )
                .await;
        }

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.check_health(None).await })
            })
            .collect();

        for handle in handles {
            let status = handle.await.unwrap();
            assert_eq!(status.checks.len(), 5);
            assert!(status.is_healthy());
        }
    }
}
