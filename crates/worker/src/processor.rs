//! Per-job delivery execution.
//!
//! For each delivered job:
//! 1. Load the transaction; terminal rows are acked without work
//! 2. Claim it (`PROCESSING`)
//! 3. Call the channel provider under the configured timeout
//! 4. Success → `SENT` + ack. Failure → classify, log, then `RETRY` with
//!    backoff or `DEAD_LETTER`
//!
//! The database `retry_count` is the authority for retry decisions; the
//! broker's attempt counter only bounds scheduling.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use courier_common::types::{Job, Transaction};
use courier_engine::classifier::{Classification, classify};
use courier_engine::queue::{DEAD_LETTER_QUEUE, Delivery, JobOptions, QueueBroker};
use courier_engine::store::{ErrorLogStore, NewErrorLog, TransactionStore};
use courier_providers::{ProviderFailure, ProviderRegistry};

use crate::retry::{RetryOutcome, backoff_delay_ms, decide};

/// Executes one delivery attempt per reserved job. Cheap to clone; shared
/// across all workers in a pool.
#[derive(Clone)]
pub struct JobProcessor {
    pool: PgPool,
    broker: QueueBroker,
    providers: Arc<ProviderRegistry>,
    provider_timeout: Duration,
}

impl JobProcessor {
    pub fn new(
        pool: PgPool,
        broker: QueueBroker,
        providers: Arc<ProviderRegistry>,
        provider_timeout: Duration,
    ) -> Self {
        Self { pool, broker, providers, provider_timeout }
    }

    /// Process one reserved job to an acked/retried/buried state. Errors
    /// returned here are infrastructure failures (store or broker); the
    /// job's lease then expires and the broker re-delivers.
    pub async fn process(&self, queue: &str, delivery: &Delivery) -> anyhow::Result<()> {
        let job = &delivery.job;
        let transaction_id = job.transaction_id;
        let job_id = transaction_id.to_string();

        let Some(tx) = TransactionStore::get(&self.pool, transaction_id).await? else {
            tracing::warn!(transaction_id = %transaction_id, "Job without transaction row, discarding");
            self.broker.ack(queue, &job_id).await?;
            return Ok(());
        };

        // Re-delivery of a finished transaction is a no-op ack
        if tx.status.is_terminal() {
            tracing::debug!(
                transaction_id = %transaction_id,
                status = %tx.status,
                "Transaction already terminal, acking re-delivery"
            );
            self.broker.ack(queue, &job_id).await?;
            return Ok(());
        }

        let Some(tx) = TransactionStore::mark_processing(&self.pool, transaction_id).await? else {
            // Raced to terminal between the read and the claim
            self.broker.ack(queue, &job_id).await?;
            return Ok(());
        };

        tracing::info!(
            transaction_id = %transaction_id,
            channel = %job.channel,
            attempt = delivery.attempts_made,
            "Processing delivery"
        );

        match self.send(job).await {
            Ok(provider_response) => {
                TransactionStore::mark_sent(&self.pool, transaction_id, &provider_response).await?;
                self.broker.ack(queue, &job_id).await?;

                tracing::info!(
                    transaction_id = %transaction_id,
                    channel = %job.channel,
                    "Delivery succeeded"
                );
                Ok(())
            }
            Err(failure) => self.handle_failure(queue, delivery, &tx, failure).await,
        }
    }

    /// Invoke the channel's provider under the per-call timeout.
    async fn send(&self, job: &Job) -> Result<serde_json::Value, ProviderFailure> {
        let provider = self.providers.get(job.channel);

        let result = tokio::time::timeout(
            self.provider_timeout,
            provider.send(
                &job.recipient,
                job.subject.as_deref(),
                &job.content,
                Some(&job.metadata),
            ),
        )
        .await
        .map_err(|_| ProviderFailure::timeout(provider.name(), &job.recipient, self.provider_timeout))??;

        Ok(serde_json::json!({
            "provider": result.provider,
            "providerMessageId": result.provider_message_id,
            "rawResponse": result.raw_response,
        }))
    }

    async fn handle_failure(
        &self,
        queue: &str,
        delivery: &Delivery,
        tx: &Transaction,
        failure: ProviderFailure,
    ) -> anyhow::Result<()> {
        let transaction_id = tx.transaction_id;
        let job_id = transaction_id.to_string();
        let classification = classify(&failure);

        tracing::warn!(
            transaction_id = %transaction_id,
            error_type = %classification.kind,
            retryable = classification.retryable,
            error = %failure,
            "Delivery attempt failed"
        );

        ErrorLogStore::append(
            &self.pool,
            &NewErrorLog {
                transaction_id,
                error_type: classification.kind,
                error_message: failure.message.clone(),
                error_stack: failure.source.as_ref().map(|s| s.to_string()),
                error_code: failure.error_code.clone(),
                retryable: classification.retryable,
                provider_response: failure.status_code.map(|status| {
                    serde_json::json!({ "statusCode": status, "provider": failure.provider })
                }),
            },
        )
        .await?;

        match decide(classification.retryable, tx.retry_count, tx.max_retries) {
            RetryOutcome::Retry => {
                match TransactionStore::mark_retry(&self.pool, transaction_id, &failure.message).await? {
                    Some(retry_count) => {
                        let delay_ms = backoff_delay_ms(
                            delivery.opts.backoff_base_ms,
                            delivery.opts.backoff_multiplier,
                            retry_count,
                        );
                        self.broker.retry(queue, &job_id, delay_ms).await?;

                        tracing::info!(
                            transaction_id = %transaction_id,
                            retry_count,
                            delay_ms,
                            "Retry scheduled"
                        );
                        Ok(())
                    }
                    // The guarded update refused: the row hit its limit (or
                    // went terminal) between the read and the increment
                    None => self.dead_letter(queue, delivery, &classification, &failure).await,
                }
            }
            RetryOutcome::DeadLetter => {
                self.dead_letter(queue, delivery, &classification, &failure).await
            }
        }
    }

    /// Terminal failure: finish the row, drop the live job, and record a
    /// dead-letter entry for manual inspection.
    async fn dead_letter(
        &self,
        queue: &str,
        delivery: &Delivery,
        classification: &Classification,
        failure: &ProviderFailure,
    ) -> anyhow::Result<()> {
        let transaction_id = delivery.job.transaction_id;
        let job_id = transaction_id.to_string();

        TransactionStore::mark_dead_letter(&self.pool, transaction_id, &failure.message).await?;
        self.broker.bury(queue, &job_id).await?;
        self.broker
            .enqueue(
                DEAD_LETTER_QUEUE,
                &delivery.job,
                &JobOptions::dead_letter(delivery.job.priority),
            )
            .await?;

        tracing::warn!(
            transaction_id = %transaction_id,
            error_type = %classification.kind,
            retryable = classification.retryable,
            "Transaction dead-lettered"
        );
        Ok(())
    }
}
