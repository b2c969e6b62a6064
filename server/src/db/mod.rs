//! Database Layer
//!
//! Connection handling for the deliberation store and the Redis client
//! backing the analytics cache.

mod models;
mod queries;

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::config::Config;

pub use models::*;
pub use queries::*;

/// How long a caller waits for a pooled connection. Outcome persistence
/// is best-effort, so a saturated pool must fail the write quickly
/// instead of stalling the response.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect to the deliberation store and bring its schema up to date.
///
/// Pool size comes from `DATABASE_MAX_CONNECTIONS`; the analytics
/// read side and the best-effort writers share this pool.
pub async fn connect(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&config.database_url)
        .await
        .context("deliberation store unreachable")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("deliberation store migration failed")?;

    info!(
        max_connections = config.db_max_connections,
        "Deliberation store ready"
    );
    Ok(pool)
}

/// Connect the Redis client backing the analytics cache.
///
/// The cache is optional; callers fall back to the in-process store
/// when this fails.
pub async fn create_cache_client(redis_url: &str) -> Result<fred::clients::Client> {
    use fred::prelude::{ClientLike, Config as RedisConfig};

    let client = fred::clients::Client::new(RedisConfig::from_url(redis_url)?, None, None, None);
    client.connect();
    client
        .wait_for_connect()
        .await
        .context("analytics cache unreachable")?;

    info!("Analytics cache connected");
    Ok(client)
}
