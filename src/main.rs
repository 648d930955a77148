use famledger::configuration::get_configuration;
use famledger::health::Metrics;
use famledger::startup::{build_health_service, run};
use famledger::telemetry::{get_subscriber, init_subscriber};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use std::net::TcpListener;
use std::time::Duration;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let subscriber = get_subscriber("famledger".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    let settings = get_configuration().expect("Failed to read configuration.");

    tracing::info!(
        db_host = %settings.database.host,
        db_port = settings.database.port,
        db_name = %settings.database.database_name,
        "Connecting to PostgreSQL"
    );

    let connect_options = PgConnectOptions::new()
        .host(&settings.database.host)
        .port(settings.database.port)
        .username(&settings.database.username)
        .password(&settings.database.password)
        .database(&settings.database.database_name)
        .ssl_mode(PgSslMode::Disable);

    // Connect lazily: an unreachable database shows up on /ready instead of
    // keeping the process from starting.
    let pg_pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(settings.health.probe_timeout())
        .idle_timeout(Duration::from_secs(300))
        .connect_lazy_with(connect_options);

    let metrics = Metrics::global();
    metrics.initialize();

    let health = build_health_service(&settings, pg_pool, metrics.clone()).await;

    let address = format!("{}:{}", settings.app_host, settings.app_port);
    tracing::info!(version = %health.version(), "Start server at {:?}", &address);
    let listener = TcpListener::bind(&address)
        .unwrap_or_else(|err| panic!("failed to bind to {}: {}", address, err));

    run(listener, health, metrics, settings)?.await
}
