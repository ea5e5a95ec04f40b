//! Schema migrations.

use crate::error::DbError;
use crate::pool::DbPool;

/// Run all pending migrations.
///
/// Migrations are embedded at compile time from `migrations/` and applied in
/// filename order.
///
/// ```rust,ignore
/// use dirgraph_db::{DbPool, run_migrations};
///
/// let pool = DbPool::connect("postgres://localhost/dirgraph").await?;
/// run_migrations(&pool).await?;
/// ```
///
/// # Errors
///
/// Returns `DbError::MigrationFailed` if any migration fails to apply.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    tracing::info!("Running database migrations");

    sqlx::migrate!("./migrations")
        .run(pool.inner())
        .await
        .map_err(DbError::MigrationFailed)?;

    tracing::info!("Migrations completed");
    Ok(())
}
