//! Database connection pool.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::DbError;

/// Wrapper around the Postgres pool with control-plane defaults.
#[derive(Debug, Clone)]
pub struct DbPool {
    pool: PgPool,
}

impl DbPool {
    /// Connect with default pool sizing.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        Self::connect_with(database_url, 10).await
    }

    /// Connect with an explicit connection cap.
    pub async fn connect_with(database_url: &str, max_connections: u32) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(DbError::ConnectionFailed)?;
        Ok(Self { pool })
    }

    /// Access the underlying `sqlx` pool.
    #[must_use]
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }
}
