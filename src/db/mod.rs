/// Database Module
///
/// This module handles all PostgreSQL warehouse operations including:
/// - Connection pool management
/// - Schema migrations
/// - The SQL maintenance operations the scheduler triggers every Nth cycle
use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    ///
    /// Sized for the chunk worker fan-out plus the scheduler's own
    /// maintenance connection; each chunk transaction checks out its own
    /// connection.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL database")?;

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.context("Failed to run database migrations")?;

        tracing::info!("Database migrations completed successfully");
        Ok(())
    }

    /// Test the database connection
    pub async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.context("Database connection test failed")?;

        Ok(())
    }

    /// Refresh the latest-position-per-aircraft materialized view
    pub async fn refresh_latest_positions(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT refresh_latest_positions()").execute(&self.pool).await?;

        Ok(())
    }

    /// Recompute hourly aggregate rows; returns how many buckets were written
    pub async fn aggregate_hourly_stats(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT aggregate_hourly_stats()").fetch_one(&self.pool).await
    }

    /// Delete fact rows past the retention horizon; returns the deleted count
    pub async fn cleanup_old_positions(&self, retention_hours: i32) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT cleanup_old_positions($1)").bind(retention_hours).fetch_one(&self.pool).await
    }
}
