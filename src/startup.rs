use crate::configuration::Settings;
use crate::db::PostgresPing;
use crate::health::{Criticality, HealthService, Metrics, PingChecker};
use crate::middleware;
use crate::routes;
use actix_web::{dev::Server, web, App, HttpServer};
use sqlx::PgPool;
use std::net::TcpListener;
use std::sync::Arc;

/// Registers one checker per external dependency. Called once, before the
/// server starts accepting traffic.
pub async fn build_health_service(
    settings: &Settings,
    pg_pool: PgPool,
    metrics: Arc<Metrics>,
) -> Arc<HealthService> {
    let health = HealthService::new(settings.version())
        .with_readiness_timeout(settings.health.readiness_timeout());

    let postgres = PingChecker::new("postgresql", PostgresPing::new(pg_pool, metrics))
        .with_timeout(settings.health.probe_timeout());
    health
        .add_checker(Arc::new(postgres), Criticality::Critical)
        .await;

    Arc::new(health)
}

pub fn run(
    listener: TcpListener,
    health: Arc<HealthService>,
    metrics: Arc<Metrics>,
    settings: Settings,
) -> Result<Server, std::io::Error> {
    let exempt_paths = settings.metrics.exempt_paths.clone();
    let health = web::Data::new(health);
    let metrics = web::Data::new(metrics);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(
                middleware::RequestMetrics::new(metrics.get_ref().clone())
                    .exempt_paths(exempt_paths.clone()),
            )
            .wrap(middleware::RequestLogger)
            .app_data(health.clone())
            .app_data(metrics.clone())
            .service(routes::health_check)
            .service(routes::readiness_check)
            .service(routes::liveness_check)
            .service(routes::metrics_handler)
    })
    .listen(listener)?
    .run();

    Ok(server)
}
