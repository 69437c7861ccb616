//! PostgreSQL persistence for the item store.

pub mod config;
pub mod models;
pub mod pg;
pub mod repositories;

use folio_core::CoreError;
use sqlx::postgres::PgPoolOptions;

pub use config::{ConfigError, DbConfig};
pub use pg::{PgRepository, PgSchemaProvider, PgTransaction};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Create a connection pool sized by `config`.
pub async fn create_pool_with(config: &DbConfig) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
}

/// Round-trip a trivial query to verify the pool can reach the database.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}

/// SQLSTATE codes Postgres raises when concurrent transactions collide.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Map a database error onto the store taxonomy.
///
/// Errors caused by a concurrent writer surface as conflicts: unique
/// violations on `(item_id, number)`, foreign key violations against an item
/// deleted meanwhile, and serialization failures or deadlocks. Everything
/// else is logged and reported as internal.
pub(crate) fn db_error(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &err {
        let concurrent = db.is_unique_violation()
            || db.is_foreign_key_violation()
            || matches!(
                db.code().as_deref(),
                Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED)
            );
        if concurrent {
            tracing::debug!(error = %db, "Concurrent write mapped to conflict");
            return CoreError::Conflict(format!("Concurrent write rejected: {}", db.message()));
        }
    }
    tracing::error!(error = %err, "Database error");
    CoreError::Internal(err.to_string())
}
