//! Courier delivery worker binary entrypoint.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;

use courier_common::config::AppConfig;
use courier_common::pool::{connect_postgres, connect_redis};
use courier_engine::queue::{PRIORITY_QUEUE, QueueBroker, REGULAR_QUEUE};
use courier_providers::ProviderRegistry;
use courier_worker::pool::WorkerPool;
use courier_worker::processor::JobProcessor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_worker=info,courier_engine=info".into()),
        )
        .json()
        .init();

    tracing::info!("Courier worker starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = connect_postgres(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Connect to Redis
    let redis = connect_redis(&config.redis_url).await?;
    let broker = QueueBroker::new(redis);

    // Wire providers
    let providers = Arc::new(ProviderRegistry::from_config(&config)?);

    let processor = JobProcessor::new(
        pool.clone(),
        broker.clone(),
        providers,
        Duration::from_millis(config.provider_timeout_ms),
    );

    // One pool per queue, independently sized
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();

    WorkerPool::new(
        REGULAR_QUEUE,
        config.queue_concurrency,
        processor.clone(),
        broker.clone(),
    )
    .spawn(&mut tasks, shutdown_rx.clone());

    WorkerPool::new(
        PRIORITY_QUEUE,
        config.priority_queue_concurrency,
        processor,
        broker,
    )
    .spawn(&mut tasks, shutdown_rx);

    tracing::info!(
        regular_concurrency = config.queue_concurrency,
        priority_concurrency = config.priority_queue_concurrency,
        "Worker pools running"
    );

    // Run until shutdown signal, then drain with a bounded deadline
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, draining in-flight jobs...");
    shutdown_tx.send(true)?;

    let grace = Duration::from_secs(config.shutdown_grace_secs);
    if tokio::time::timeout(grace, async {
        while tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        // Undrained jobs keep their leases and are re-delivered on restart
        tracing::warn!(
            grace_secs = config.shutdown_grace_secs,
            "Drain deadline reached, abandoning remaining jobs"
        );
        tasks.abort_all();
    }

    tracing::info!("Courier worker stopped.");
    Ok(())
}
