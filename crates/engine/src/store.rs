//! Transaction and error-log persistence.
//!
//! Status transitions are guarded in SQL: terminal rows (`SENT`,
//! `DEAD_LETTER`) never match the update conditions, so a redelivered or
//! racing writer cannot move a finished transaction. `retry_count` lives in
//! the database and is the sole authority for retry decisions; the broker's
//! attempt counter is an upper bound only.

use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{
    Channel, ErrorKind, ErrorLog, NotificationType, Priority, Transaction,
};

/// Service layer for transaction rows.
pub struct TransactionStore;

/// Parameters for creating a new transaction.
#[derive(Debug, Clone)]
pub struct CreateTransactionParams {
    pub user_id: String,
    pub notification_type: NotificationType,
    pub channel: Channel,
    pub content: String,
    pub subject: Option<String>,
    pub recipient: String,
    pub metadata: serde_json::Value,
    pub priority: Priority,
    pub max_retries: i32,
}

impl TransactionStore {
    /// Create a transaction in `PENDING` with a fresh id.
    pub async fn create(
        pool: &PgPool,
        params: &CreateTransactionParams,
    ) -> Result<Transaction, AppError> {
        let id = Uuid::new_v4();

        let tx: Transaction = sqlx::query_as(
            r#"
            INSERT INTO transactions
                (transaction_id, user_id, notification_type, channel, status,
                 content, subject, recipient, metadata, priority, retry_count, max_retries)
            VALUES ($1, $2, $3, $4, 'PENDING', $5, $6, $7, $8, $9, 0, $10)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&params.user_id)
        .bind(params.notification_type)
        .bind(params.channel)
        .bind(&params.content)
        .bind(&params.subject)
        .bind(&params.recipient)
        .bind(&params.metadata)
        .bind(params.priority)
        .bind(params.max_retries)
        .fetch_one(pool)
        .await?;

        tracing::info!(
            transaction_id = %tx.transaction_id,
            user_id = %tx.user_id,
            channel = %tx.channel,
            priority = %tx.priority,
            "Transaction created"
        );

        Ok(tx)
    }

    pub async fn get(pool: &PgPool, transaction_id: Uuid) -> Result<Option<Transaction>, AppError> {
        let tx: Option<Transaction> =
            sqlx::query_as("SELECT * FROM transactions WHERE transaction_id = $1")
                .bind(transaction_id)
                .fetch_optional(pool)
                .await?;

        Ok(tx)
    }

    /// Advance `PENDING → QUEUED` after a successful enqueue.
    pub async fn mark_queued(pool: &PgPool, transaction_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'QUEUED', updated_at = NOW()
            WHERE transaction_id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(transaction_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Claim the transaction for a delivery attempt. Returns `None` when the
    /// row is already terminal, which the worker treats as a no-op ack.
    pub async fn mark_processing(
        pool: &PgPool,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, AppError> {
        let tx: Option<Transaction> = sqlx::query_as(
            r#"
            UPDATE transactions
            SET status = 'PROCESSING', updated_at = NOW()
            WHERE transaction_id = $1 AND status NOT IN ('SENT', 'DEAD_LETTER')
            RETURNING *
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(pool)
        .await?;

        Ok(tx)
    }

    /// Terminal success: sets `sent_at`, clears `failure_reason`, and stores
    /// the provider acknowledgement under `metadata.providerResponse`.
    pub async fn mark_sent(
        pool: &PgPool,
        transaction_id: Uuid,
        provider_response: &serde_json::Value,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'SENT',
                sent_at = NOW(),
                updated_at = NOW(),
                failure_reason = NULL,
                metadata = jsonb_set(metadata, '{providerResponse}', $2)
            WHERE transaction_id = $1 AND status NOT IN ('SENT', 'DEAD_LETTER')
            "#,
        )
        .bind(transaction_id)
        .bind(provider_response)
        .execute(pool)
        .await?;

        tracing::info!(transaction_id = %transaction_id, "Transaction sent");
        Ok(())
    }

    /// Schedule another attempt: atomically increments `retry_count` and
    /// records the failure reason. Returns the new count, or `None` when the
    /// row is terminal or out of retries (caller then dead-letters).
    pub async fn mark_retry(
        pool: &PgPool,
        transaction_id: Uuid,
        failure_reason: &str,
    ) -> Result<Option<i32>, AppError> {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE transactions
            SET status = 'RETRY',
                retry_count = retry_count + 1,
                failure_reason = $2,
                updated_at = NOW()
            WHERE transaction_id = $1
              AND status NOT IN ('SENT', 'DEAD_LETTER')
              AND retry_count < max_retries
            RETURNING retry_count
            "#,
        )
        .bind(transaction_id)
        .bind(failure_reason)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|(count,)| count))
    }

    /// Terminal failure: no further delivery attempts.
    pub async fn mark_dead_letter(
        pool: &PgPool,
        transaction_id: Uuid,
        failure_reason: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'DEAD_LETTER',
                failed_at = NOW(),
                updated_at = NOW(),
                failure_reason = $2
            WHERE transaction_id = $1 AND status NOT IN ('SENT', 'DEAD_LETTER')
            "#,
        )
        .bind(transaction_id)
        .bind(failure_reason)
        .execute(pool)
        .await?;

        tracing::warn!(
            transaction_id = %transaction_id,
            failure_reason,
            "Transaction dead-lettered"
        );
        Ok(())
    }
}

/// Parameters for one error-log row.
#[derive(Debug, Clone)]
pub struct NewErrorLog {
    pub transaction_id: Uuid,
    pub error_type: ErrorKind,
    pub error_message: String,
    pub error_stack: Option<String>,
    pub error_code: Option<String>,
    pub retryable: bool,
    pub provider_response: Option<serde_json::Value>,
}

/// Append-only store for per-attempt failure records.
pub struct ErrorLogStore;

impl ErrorLogStore {
    pub async fn append(pool: &PgPool, entry: &NewErrorLog) -> Result<ErrorLog, AppError> {
        let log: ErrorLog = sqlx::query_as(
            r#"
            INSERT INTO error_logs
                (id, transaction_id, error_type, error_message, error_stack,
                 error_code, retryable, provider_response)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.transaction_id)
        .bind(entry.error_type)
        .bind(&entry.error_message)
        .bind(&entry.error_stack)
        .bind(&entry.error_code)
        .bind(entry.retryable)
        .bind(&entry.provider_response)
        .fetch_one(pool)
        .await?;

        tracing::debug!(
            transaction_id = %entry.transaction_id,
            error_type = %entry.error_type,
            retryable = entry.retryable,
            "Error logged"
        );

        Ok(log)
    }

    /// All failure records for a transaction, newest first.
    pub async fn list_for_transaction(
        pool: &PgPool,
        transaction_id: Uuid,
    ) -> Result<Vec<ErrorLog>, AppError> {
        let logs: Vec<ErrorLog> = sqlx::query_as(
            "SELECT * FROM error_logs WHERE transaction_id = $1 ORDER BY created_at DESC",
        )
        .bind(transaction_id)
        .fetch_all(pool)
        .await?;

        Ok(logs)
    }
}
