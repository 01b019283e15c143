//! Database migration management.
//!
//! Migrations are embedded at compile time from the `migrations/`
//! directory and run in filename order.

use crate::error::DbError;
use crate::pool::DbPool;

/// Run all pending database migrations.
///
/// # Errors
///
/// Returns `DbError::MigrationFailed` if any migration fails to apply.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    tracing::info!("running database migrations");

    sqlx::migrate!("./migrations")
        .run(pool.inner())
        .await
        .map_err(DbError::MigrationFailed)?;

    tracing::info!("migrations complete");
    Ok(())
}
