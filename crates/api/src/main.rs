//! Courier API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use courier_common::config::AppConfig;
use courier_common::pool::{connect_postgres, connect_redis};
use courier_engine::dispatcher::{DispatchDefaults, Dispatcher};
use courier_engine::queue::QueueBroker;
use courier_providers::ProviderRegistry;

use courier_api::routes::create_router;
use courier_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("courier_api=debug,courier_engine=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting Courier API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool
    let pool = connect_postgres(&config.database_url, config.db_max_connections).await?;
    tracing::info!("Database pool created");

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Create Redis connection
    let redis = connect_redis(&config.redis_url).await?;
    let broker = QueueBroker::new(redis);

    // Wire the submission pipeline
    let providers = Arc::new(ProviderRegistry::from_config(&config)?);
    let dispatcher = Dispatcher::new(
        pool.clone(),
        broker.clone(),
        providers,
        DispatchDefaults {
            max_retries: config.max_retry_attempts,
            retry_delay_ms: config.retry_delay_ms,
            backoff_multiplier: config.backoff_multiplier,
        },
    );

    // Build application state
    let state = AppState::new(pool, broker, dispatcher, config);

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
