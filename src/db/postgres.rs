use crate::health::{Metrics, Ping};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::Instrument;

/// Round-trips a trivial query through the pool so the health checker can
/// tell whether PostgreSQL is reachable.
pub struct PostgresPing {
    pool: PgPool,
    metrics: Arc<Metrics>,
}

impl PostgresPing {
    pub fn new(pool: PgPool, metrics: Arc<Metrics>) -> Self {
        Self { pool, metrics }
    }
}

#[async_trait]
impl Ping for PostgresPing {
    async fn ping(&self) -> anyhow::Result<()> {
        let query_span = tracing::info_span!("Pinging the database");
        self.metrics
            .track_database_operation(
                "ping",
                "postgresql",
                sqlx::query("SELECT 1 as health_check").execute(&self.pool),
            )
            .instrument(query_span)
            .await
            .map(|_| ())
            .map_err(|err| {
                tracing::error!("Database ping failed: {:?}", err);
                anyhow::Error::new(err).context("database ping failed")
            })
    }
}
