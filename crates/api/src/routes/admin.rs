//! Admin read endpoints: dashboard, transaction search, failure search,
//! and analytics over the same data model the pipeline writes.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{ErrorLog, Transaction};
use courier_engine::analytics::{
    self, ChannelStats, ErrorAnalytics, FailedFilter, TransactionDetail, TransactionFilter,
};
use courier_engine::queue::{PRIORITY_QUEUE, QueueStats, REGULAR_QUEUE};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/dashboard", get(dashboard))
        .route("/admin/transactions", get(search_transactions))
        .route("/admin/transactions/{transaction_id}", get(transaction_detail))
        .route("/admin/failed", get(search_failed))
        .route("/admin/analytics/errors", get(error_analytics))
        .route("/admin/analytics/channels", get(channel_analytics))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DashboardQuery {
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueueStatsBundle {
    regular: QueueStats,
    priority: QueueStats,
}

/// GET /admin/dashboard?userId= — Delivery statistics plus live queue depths.
async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let statistics =
        analytics::dashboard_statistics(&state.pool, query.user_id.as_deref()).await?;
    let queue_stats = QueueStatsBundle {
        regular: state.broker.stats(REGULAR_QUEUE).await?,
        priority: state.broker.stats(PRIORITY_QUEUE).await?,
    };

    Ok(Json(json!({
        "statistics": statistics,
        "queueStats": queue_stats,
        "timestamp": Utc::now(),
    })))
}

/// GET /admin/transactions — Filtered, paged transaction listing.
async fn search_transactions(
    State(state): State<AppState>,
    Query(filter): Query<TransactionFilter>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let transactions = analytics::search_transactions(&state.pool, &filter).await?;
    Ok(Json(transactions))
}

/// GET /admin/transactions/:transaction_id — One transaction with its
/// failure history, newest first.
async fn transaction_detail(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<TransactionDetail>, AppError> {
    let detail = analytics::transaction_detail(&state.pool, transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {transaction_id} not found")))?;
    Ok(Json(detail))
}

/// GET /admin/failed — Filtered, paged failure listing.
async fn search_failed(
    State(state): State<AppState>,
    Query(filter): Query<FailedFilter>,
) -> Result<Json<Vec<ErrorLog>>, AppError> {
    let failures = analytics::search_failed(&state.pool, &filter).await?;
    Ok(Json(failures))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DateRangeQuery {
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
}

/// GET /admin/analytics/errors — Error totals, breakdowns, recent failures.
async fn error_analytics(
    State(state): State<AppState>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<ErrorAnalytics>, AppError> {
    let report = analytics::error_analytics(&state.pool, range.start_date, range.end_date).await?;
    Ok(Json(report))
}

/// GET /admin/analytics/channels — Per-channel delivery outcomes and rates.
async fn channel_analytics(
    State(state): State<AppState>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<Vec<ChannelStats>>, AppError> {
    let report = analytics::channel_analytics(&state.pool, range.start_date, range.end_date).await?;
    Ok(Json(report))
}
