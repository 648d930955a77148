use crate::health::Metrics;
use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::{
    future::LocalBoxFuture,
    task::{Context, Poll},
};
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_EXEMPT_PATHS: &[&str] = &["/health", "/ready", "/live", "/metrics"];

/// Records `http_requests_total`, request latency and `http_errors_total` for
/// every request whose path is not exempt.
pub struct RequestMetrics {
    metrics: Arc<Metrics>,
    exempt_paths: Rc<Vec<String>>,
}

impl RequestMetrics {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            exempt_paths: Rc::new(DEFAULT_EXEMPT_PATHS.iter().map(|p| p.to_string()).collect()),
        }
    }

    /// Replaces the exempt list. An empty list records monitoring traffic too.
    pub fn exempt_paths(mut self, paths: Vec<String>) -> Self {
        self.exempt_paths = Rc::new(paths);
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestMetrics
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestMetricsMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestMetricsMiddleware {
            service: Rc::new(service),
            metrics: self.metrics.clone(),
            exempt_paths: self.exempt_paths.clone(),
        }))
    }
}

pub struct RequestMetricsMiddleware<S> {
    service: Rc<S>,
    metrics: Arc<Metrics>,
    exempt_paths: Rc<Vec<String>>,
}

struct InFlight(Arc<Metrics>);

impl InFlight {
    fn start(metrics: Arc<Metrics>) -> Self {
        metrics.http_requests_in_flight.inc();
        Self(metrics)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.http_requests_in_flight.dec();
    }
}

fn error_type(err: &Error) -> String {
    let status = err.as_response_error().status_code();
    if status.is_client_error() || status.is_server_error() {
        status.as_str().to_string()
    } else {
        "unknown".to_string()
    }
}

impl<S, B> Service<ServiceRequest> for RequestMetricsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<ServiceResponse<B>, Error>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if self.exempt_paths.iter().any(|path| path == req.path()) {
            return Box::pin(self.service.call(req));
        }

        let metrics = self.metrics.clone();
        let method = req.method().to_string();
        let route = req
            .match_pattern()
            .unwrap_or_else(|| req.path().to_string());
        let start = Instant::now();
        let in_flight = InFlight::start(metrics.clone());
        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            drop(in_flight);
            let seconds = start.elapsed().as_secs_f64();

            match &result {
                Ok(res) => {
                    metrics.record_http_request(&method, &route, res.status().as_u16(), seconds);
                    if let Some(err) = res.response().error() {
                        metrics.record_http_error(&method, &route, &error_type(err));
                    }
                }
                Err(err) => {
                    let status = err.as_response_error().status_code();
                    metrics.record_http_request(&method, &route, status.as_u16(), seconds);
                    metrics.record_http_error(&method, &route, &error_type(err));
                }
            }

            result
        })
    }
}
