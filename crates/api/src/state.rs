//! Shared application state for the Axum API server.

use sqlx::PgPool;

use courier_common::config::AppConfig;
use courier_engine::dispatcher::Dispatcher;
use courier_engine::queue::QueueBroker;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub broker: QueueBroker,
    pub dispatcher: Dispatcher,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(pool: PgPool, broker: QueueBroker, dispatcher: Dispatcher, config: AppConfig) -> Self {
        Self { pool, broker, dispatcher, config }
    }
}
