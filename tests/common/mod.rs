use famledger::configuration::{get_configuration, Settings};
use famledger::health::{Checker, Criticality, FnChecker, HealthService, Metrics};
use std::net::TcpListener;
use std::sync::Arc;

pub struct TestApp {
    pub address: String,
    pub metrics: Arc<Metrics>,
}

pub fn test_settings() -> Settings {
    let mut configuration = get_configuration().expect("Failed to get configuration");
    configuration.app_version = Some("9.9.9-test".to_string());
    configuration
}

pub fn checker(name: &str, healthy: bool) -> Arc<dyn Checker> {
    Arc::new(FnChecker::new(name, move || async move {
        if healthy {
            Ok(())
        } else {
            Err("dependency is unreachable")
        }
    }))
}

pub async fn health_service(
    settings: &Settings,
    checkers: Vec<(Arc<dyn Checker>, Criticality)>,
) -> Arc<HealthService> {
    let health = HealthService::new(settings.version())
        .with_readiness_timeout(settings.health.readiness_timeout());
    for (checker, criticality) in checkers {
        health.add_checker(checker, criticality).await;
    }
    Arc::new(health)
}

// we have to run server in another thread
pub async fn spawn_app_with(health: Arc<HealthService>, settings: Settings) -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let metrics = Arc::new(Metrics::new().expect("Failed to create metrics"));
    metrics.initialize();

    let server = famledger::startup::run(listener, health, metrics.clone(), settings)
        .expect("Failed to bind address.");
    let _ = tokio::spawn(server);

    TestApp { address, metrics }
}

pub async fn spawn_app(checkers: Vec<(Arc<dyn Checker>, Criticality)>) -> TestApp {
    let settings = test_settings();
    let health = health_service(&settings, checkers).await;
    spawn_app_with(health, settings).await
}
