//! Admin read models: transaction search, failure search, error and
//! channel analytics, dashboard statistics.
//!
//! `FAILED` and `DEAD_LETTER` are grouped as "failed" wherever a single
//! failure figure is reported; the raw per-status counts stay visible.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{Channel, ErrorKind, ErrorLog, Transaction, TransactionStatus};

const DEFAULT_PAGE_LIMIT: i64 = 100;
const MAX_PAGE_LIMIT: i64 = 1000;
const RECENT_ERRORS_LIMIT: i64 = 50;

fn default_limit() -> i64 {
    DEFAULT_PAGE_LIMIT
}

/// Filters for `GET /admin/transactions`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFilter {
    pub transaction_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub status: Option<TransactionStatus>,
    pub channel: Option<Channel>,
    /// Case-insensitive substring match.
    pub failure_reason: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// Filters for `GET /admin/failed`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedFilter {
    pub error_type: Option<ErrorKind>,
    pub retryable: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetail {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub error_logs: Vec<ErrorLog>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ErrorTypeCount {
    pub error_type: ErrorKind,
    pub count: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RetryableCount {
    pub retryable: bool,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorAnalytics {
    pub total_errors: i64,
    pub error_type_breakdown: Vec<ErrorTypeCount>,
    pub retryable_breakdown: Vec<RetryableCount>,
    pub recent_errors: Vec<ErrorLog>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub channel: Channel,
    pub total: i64,
    pub sent: i64,
    pub failed: i64,
    pub pending: i64,
    pub retry: i64,
    pub dead_letter: i64,
    /// Percentage to 2 decimals.
    pub success_rate: f64,
    pub failure_rate: f64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStatistics {
    pub total: i64,
    pub sent: i64,
    pub pending: i64,
    pub queued: i64,
    pub processing: i64,
    pub retry: i64,
    /// FAILED and DEAD_LETTER grouped.
    pub failed: i64,
    pub dead_letter: i64,
}

/// Paged, filtered transaction listing, newest first.
pub async fn search_transactions(
    pool: &PgPool,
    filter: &TransactionFilter,
) -> Result<Vec<Transaction>, AppError> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM transactions WHERE 1=1");

    if let Some(id) = filter.transaction_id {
        qb.push(" AND transaction_id = ").push_bind(id);
    }
    if let Some(user_id) = &filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id.clone());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(channel) = filter.channel {
        qb.push(" AND channel = ").push_bind(channel);
    }
    if let Some(reason) = &filter.failure_reason {
        qb.push(" AND failure_reason ILIKE ").push_bind(format!("%{reason}%"));
    }
    if let Some(start) = filter.start_date {
        qb.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = filter.end_date {
        qb.push(" AND created_at <= ").push_bind(end);
    }

    qb.push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(clamp_limit(filter.limit))
        .push(" OFFSET ")
        .push_bind(filter.offset.max(0));

    let rows = qb.build_query_as::<Transaction>().fetch_all(pool).await?;
    Ok(rows)
}

/// One transaction with its failure history, newest first.
pub async fn transaction_detail(
    pool: &PgPool,
    transaction_id: Uuid,
) -> Result<Option<TransactionDetail>, AppError> {
    let tx: Option<Transaction> =
        sqlx::query_as("SELECT * FROM transactions WHERE transaction_id = $1")
            .bind(transaction_id)
            .fetch_optional(pool)
            .await?;

    let Some(transaction) = tx else {
        return Ok(None);
    };

    let error_logs: Vec<ErrorLog> = sqlx::query_as(
        "SELECT * FROM error_logs WHERE transaction_id = $1 ORDER BY created_at DESC",
    )
    .bind(transaction_id)
    .fetch_all(pool)
    .await?;

    Ok(Some(TransactionDetail { transaction, error_logs }))
}

/// Paged, filtered failure listing, newest first.
pub async fn search_failed(pool: &PgPool, filter: &FailedFilter) -> Result<Vec<ErrorLog>, AppError> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM error_logs WHERE 1=1");

    if let Some(error_type) = filter.error_type {
        qb.push(" AND error_type = ").push_bind(error_type);
    }
    if let Some(retryable) = filter.retryable {
        qb.push(" AND retryable = ").push_bind(retryable);
    }
    if let Some(start) = filter.start_date {
        qb.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = filter.end_date {
        qb.push(" AND created_at <= ").push_bind(end);
    }

    qb.push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(clamp_limit(filter.limit))
        .push(" OFFSET ")
        .push_bind(filter.offset.max(0));

    let rows = qb.build_query_as::<ErrorLog>().fetch_all(pool).await?;
    Ok(rows)
}

/// Aggregate error figures over an optional date window.
pub async fn error_analytics(
    pool: &PgPool,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
) -> Result<ErrorAnalytics, AppError> {
    let (total_errors,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM error_logs
        WHERE ($1::timestamptz IS NULL OR created_at >= $1)
          AND ($2::timestamptz IS NULL OR created_at <= $2)
        "#,
    )
    .bind(start_date)
    .bind(end_date)
    .fetch_one(pool)
    .await?;

    let error_type_breakdown: Vec<ErrorTypeCount> = sqlx::query_as(
        r#"
        SELECT error_type, COUNT(*) AS count FROM error_logs
        WHERE ($1::timestamptz IS NULL OR created_at >= $1)
          AND ($2::timestamptz IS NULL OR created_at <= $2)
        GROUP BY error_type
        ORDER BY count DESC
        "#,
    )
    .bind(start_date)
    .bind(end_date)
    .fetch_all(pool)
    .await?;

    let retryable_breakdown: Vec<RetryableCount> = sqlx::query_as(
        r#"
        SELECT retryable, COUNT(*) AS count FROM error_logs
        WHERE ($1::timestamptz IS NULL OR created_at >= $1)
          AND ($2::timestamptz IS NULL OR created_at <= $2)
        GROUP BY retryable
        ORDER BY retryable DESC
        "#,
    )
    .bind(start_date)
    .bind(end_date)
    .fetch_all(pool)
    .await?;

    let recent_errors: Vec<ErrorLog> = sqlx::query_as(
        r#"
        SELECT * FROM error_logs
        WHERE ($1::timestamptz IS NULL OR created_at >= $1)
          AND ($2::timestamptz IS NULL OR created_at <= $2)
        ORDER BY created_at DESC
        LIMIT $3
        "#,
    )
    .bind(start_date)
    .bind(end_date)
    .bind(RECENT_ERRORS_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(ErrorAnalytics { total_errors, error_type_breakdown, retryable_breakdown, recent_errors })
}

#[derive(sqlx::FromRow)]
struct ChannelCounts {
    channel: Channel,
    total: i64,
    sent: i64,
    failed: i64,
    pending: i64,
    retry: i64,
    dead_letter: i64,
}

/// Per-channel delivery outcomes with percentage rates.
pub async fn channel_analytics(
    pool: &PgPool,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
) -> Result<Vec<ChannelStats>, AppError> {
    let rows: Vec<ChannelCounts> = sqlx::query_as(
        r#"
        SELECT channel,
               COUNT(*) AS total,
               COUNT(*) FILTER (WHERE status = 'SENT') AS sent,
               COUNT(*) FILTER (WHERE status = 'FAILED') AS failed,
               COUNT(*) FILTER (WHERE status IN ('PENDING', 'QUEUED', 'PROCESSING')) AS pending,
               COUNT(*) FILTER (WHERE status = 'RETRY') AS retry,
               COUNT(*) FILTER (WHERE status = 'DEAD_LETTER') AS dead_letter
        FROM transactions
        WHERE ($1::timestamptz IS NULL OR created_at >= $1)
          AND ($2::timestamptz IS NULL OR created_at <= $2)
        GROUP BY channel
        ORDER BY channel
        "#,
    )
    .bind(start_date)
    .bind(end_date)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let success_rate = percentage(row.sent, row.total);
            let failure_rate = percentage(row.failed + row.dead_letter, row.total);
            ChannelStats {
                channel: row.channel,
                total: row.total,
                sent: row.sent,
                failed: row.failed,
                pending: row.pending,
                retry: row.retry,
                dead_letter: row.dead_letter,
                success_rate,
                failure_rate,
            }
        })
        .collect())
}

/// Status counts for the dashboard, optionally narrowed to one user.
pub async fn dashboard_statistics(
    pool: &PgPool,
    user_id: Option<&str>,
) -> Result<DashboardStatistics, AppError> {
    let stats: DashboardStatistics = sqlx::query_as(
        r#"
        SELECT COUNT(*) AS total,
               COUNT(*) FILTER (WHERE status = 'SENT') AS sent,
               COUNT(*) FILTER (WHERE status = 'PENDING') AS pending,
               COUNT(*) FILTER (WHERE status = 'QUEUED') AS queued,
               COUNT(*) FILTER (WHERE status = 'PROCESSING') AS processing,
               COUNT(*) FILTER (WHERE status = 'RETRY') AS retry,
               COUNT(*) FILTER (WHERE status IN ('FAILED', 'DEAD_LETTER')) AS failed,
               COUNT(*) FILTER (WHERE status = 'DEAD_LETTER') AS dead_letter
        FROM transactions
        WHERE ($1::text IS NULL OR user_id = $1)
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(stats)
}

fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_PAGE_LIMIT)
}

/// Percentage of `part` in `total`, rounded to 2 decimals; 0 when empty.
fn percentage(part: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_rounds_to_two_decimals() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(1, 1), 100.0);
    }

    #[test]
    fn test_percentage_of_empty_set_is_zero() {
        assert_eq!(percentage(0, 0), 0.0);
    }

    #[test]
    fn test_limit_clamped() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(100), 100);
        assert_eq!(clamp_limit(10_000), MAX_PAGE_LIMIT);
    }
}
