//! Connection construction for Courier's two backing stores: the
//! PostgreSQL pool behind the transaction, error-log, and preference
//! stores, and the multiplexed Redis connection behind the queue broker.

use std::time::Duration;

use redis::aio::ConnectionManager;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Connect the PostgreSQL pool the stores run on.
///
/// Size it with `AppConfig::db_max_connections`. Every in-flight delivery
/// attempt holds a connection briefly for its status transition, so the
/// pool should not be smaller than the combined worker concurrency or
/// attempts will queue on acquisition instead of on the broker.
pub async fn connect_postgres(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    tracing::info!(max_connections, "Transaction store connected to PostgreSQL");
    Ok(pool)
}

/// Connect the Redis connection the queue broker runs on.
///
/// One `ConnectionManager` is shared by cloning: it multiplexes commands
/// over a single connection and reconnects internally, so the broker, the
/// dispatcher, and every worker hold clones of the same handle.
pub async fn connect_redis(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = redis::Client::open(redis_url)?;
    let manager = ConnectionManager::new(client).await?;

    tracing::info!("Queue broker connected to Redis");
    Ok(manager)
}
