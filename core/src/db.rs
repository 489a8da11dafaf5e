use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::DatabaseConfig;

/// Database URL used by tests that need a live PostgreSQL
pub const TEST_DATABASE_URL_ENV: &str = "FLOWVAULT_DATABASE_URL";

/// Build a connection pool from the database section of the config
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let url = config
        .url
        .as_deref()
        .context("database.url must be set for the postgres backend")?;

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .connect(url)
        .await
        .context("Failed to connect to database")
}

/// Run embedded database migrations
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run migrations")?;

    Ok(())
}

/// Connect using `FLOWVAULT_DATABASE_URL` with default pool settings
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(TEST_DATABASE_URL_ENV)
        .with_context(|| format!("{} must be set", TEST_DATABASE_URL_ENV))?;

    create_pool(&DatabaseConfig {
        url: Some(url),
        ..Default::default()
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_pool_requires_url() {
        let result = create_pool(&DatabaseConfig::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires database to be running
    async fn test_pool_initialization() {
        let pool = connect_from_env().await.unwrap();
        let result: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await.unwrap();
        assert_eq!(result.0, 1);
    }
}
