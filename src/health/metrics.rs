use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::{
    Encoder, Gauge, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::future::Future;
use std::sync::{Arc, Once};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

lazy_static! {
    static ref GLOBAL: Arc<Metrics> = Arc::new(
        Metrics::with_registry(prometheus::default_registry().clone())
            .expect("Failed to create application metrics.")
    );
}

/// Registers `metric`, treating a name that is already registered as success.
///
/// The returned handle is always the one passed in; when the name was taken it
/// is not exported by `registry`.
fn register<T>(registry: &Registry, metric: T) -> Result<T, prometheus::Error>
where
    T: Collector + Clone + 'static,
{
    match registry.register(Box::new(metric.clone())) {
        Ok(()) => Ok(metric),
        Err(prometheus::Error::AlreadyReg) => {
            tracing::debug!("Metric already registered, keeping the new handle");
            Ok(metric)
        }
        Err(err) => Err(err),
    }
}

pub struct Metrics {
    registry: Registry,
    started: Instant,
    start_stamp: Once,

    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
    pub http_errors_total: IntCounterVec,
    pub http_requests_in_flight: IntGauge,

    pub db_operations_total: IntCounterVec,
    pub db_operation_duration_seconds: HistogramVec,

    pub users_total: IntGauge,
    pub categories_total: IntGauge,
    pub transactions_total: IntGauge,
    pub active_budgets: IntGauge,
    pub reports_generated_total: IntCounterVec,

    pub start_time_seconds: Gauge,
    pub uptime_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Process-wide instance exported through the Prometheus default registry.
    /// Built on first use; every caller gets the same instance.
    pub fn global() -> Arc<Metrics> {
        GLOBAL.clone()
    }

    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let http_requests_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("http_requests_total", "Total number of HTTP requests"),
                &["method", "route", "status"],
            )?,
        )?;
        let http_request_duration_seconds = register(
            &registry,
            HistogramVec::new(
                HistogramOpts::new(
                    "http_request_duration_seconds",
                    "HTTP request duration in seconds",
                )
                .buckets(LATENCY_BUCKETS.to_vec()),
                &["method", "route", "status"],
            )?,
        )?;
        let http_errors_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("http_errors_total", "Total number of failed HTTP requests"),
                &["method", "route", "error_type"],
            )?,
        )?;
        let http_requests_in_flight = register(
            &registry,
            IntGauge::new(
                "http_requests_in_flight",
                "Number of HTTP requests currently being served",
            )?,
        )?;

        let db_operations_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("db_operations_total", "Total number of database operations"),
                &["operation", "resource", "status"],
            )?,
        )?;
        let db_operation_duration_seconds = register(
            &registry,
            HistogramVec::new(
                HistogramOpts::new(
                    "db_operation_duration_seconds",
                    "Database operation duration in seconds",
                )
                .buckets(LATENCY_BUCKETS.to_vec()),
                &["operation", "resource"],
            )?,
        )?;

        let users_total = register(
            &registry,
            IntGauge::new("famledger_users_total", "Number of registered users")?,
        )?;
        let categories_total = register(
            &registry,
            IntGauge::new("famledger_categories_total", "Number of categories")?,
        )?;
        let transactions_total = register(
            &registry,
            IntGauge::new("famledger_transactions_total", "Number of recorded transactions")?,
        )?;
        let active_budgets = register(
            &registry,
            IntGauge::new("famledger_active_budgets", "Number of budgets currently active")?,
        )?;
        let reports_generated_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("famledger_reports_generated_total", "Number of generated reports"),
                &["kind"],
            )?,
        )?;

        let start_time_seconds = register(
            &registry,
            Gauge::new("app_start_time_seconds", "Unix time the application started")?,
        )?;
        let uptime_seconds = register(
            &registry,
            Gauge::new("app_uptime_seconds", "Seconds since the application started")?,
        )?;

        Ok(Self {
            registry,
            started: Instant::now(),
            start_stamp: Once::new(),
            http_requests_total,
            http_request_duration_seconds,
            http_errors_total,
            http_requests_in_flight,
            db_operations_total,
            db_operation_duration_seconds,
            users_total,
            categories_total,
            transactions_total,
            active_budgets,
            reports_generated_total,
            start_time_seconds,
            uptime_seconds,
        })
    }

    /// Stamps the start-time gauge. Later calls keep the first value.
    pub fn initialize(&self) {
        self.start_stamp.call_once(|| {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64();
            self.start_time_seconds.set(now);
        });
        self.update_uptime();
    }

    pub fn update_uptime(&self) {
        self.uptime_seconds.set(self.started.elapsed().as_secs_f64());
    }

    pub fn record_http_request(&self, method: &str, route: &str, status: u16, seconds: f64) {
        let status = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, route, &status])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, route, &status])
            .observe(seconds);
    }

    pub fn record_http_error(&self, method: &str, route: &str, error_type: &str) {
        self.http_errors_total
            .with_label_values(&[method, route, error_type])
            .inc();
    }

    pub fn record_database_operation(
        &self,
        operation: &str,
        resource: &str,
        status: &str,
        seconds: f64,
    ) {
        self.db_operations_total
            .with_label_values(&[operation, resource, status])
            .inc();
        self.db_operation_duration_seconds
            .with_label_values(&[operation, resource])
            .observe(seconds);
    }

    /// Awaits `operation` and records its duration and outcome; the result is
    /// handed back untouched.
    pub async fn track_database_operation<T, E, F>(
        &self,
        operation: &str,
        resource: &str,
        future: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        let result = future.await;
        let status = if result.is_ok() { "success" } else { "error" };
        self.record_database_operation(operation, resource, status, start.elapsed().as_secs_f64());
        result
    }

    pub fn record_report_generated(&self, kind: &str) {
        self.reports_generated_total.with_label_values(&[kind]).inc();
    }

    /// Renders every registered metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }
}
