//! Apply database migrations.
//!
//! Reads `DATABASE_URL` (and optionally `DB_MAX_CONNECTIONS`) from the
//! environment or a `.env` file.

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio_db::DbConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio_db=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = DbConfig::from_env()?;
    let pool = folio_db::create_pool_with(&config)
        .await
        .context("Failed to connect to database")?;
    tracing::info!(max_connections = config.max_connections, "Database connection pool created");

    folio_db::health_check(&pool)
        .await
        .context("Database health check failed")?;

    folio_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(())
}
