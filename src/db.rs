use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::warn;

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("connect to database")
}

/// Applies `./migrations`; a failure is logged and startup continues.
pub async fn migrate(pool: &PgPool) {
    if let Err(e) = sqlx::migrate!("./migrations").run(pool).await {
        warn!(error = %e, "migrations folder not found or migration failed; continuing");
    }
}
