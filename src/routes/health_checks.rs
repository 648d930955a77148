use crate::health::{HealthService, Metrics};
use actix_web::{get, web, HttpResponse};
use std::sync::Arc;
use tokio::time::Instant;

#[get("/health")]
pub async fn health_check(health: web::Data<Arc<HealthService>>) -> HttpResponse {
    let status = health.check_health(None).await;
    if status.is_healthy() {
        HttpResponse::Ok().json(status)
    } else {
        HttpResponse::ServiceUnavailable().json(status)
    }
}

#[get("/ready")]
pub async fn readiness_check(health: web::Data<Arc<HealthService>>) -> HttpResponse {
    let deadline = Instant::now() + health.readiness_timeout();
    let readiness = health.readiness(Some(deadline)).await;
    if readiness.ready {
        HttpResponse::Ok().json(readiness)
    } else {
        HttpResponse::ServiceUnavailable().json(readiness)
    }
}

#[get("/live")]
pub async fn liveness_check(health: web::Data<Arc<HealthService>>) -> HttpResponse {
    HttpResponse::Ok().json(health.liveness())
}

#[get("/metrics")]
pub async fn metrics_handler(metrics: web::Data<Arc<Metrics>>) -> HttpResponse {
    metrics.update_uptime();
    match metrics.encode() {
        Ok(body) => HttpResponse::Ok()
            .content_type(prometheus::TEXT_FORMAT)
            .body(body),
        Err(err) => {
            tracing::error!("Failed to encode metrics: {:?}", err);
            HttpResponse::InternalServerError().finish()
        }
    }
}
