//! Submission path.
//!
//! For each request:
//! 1. Defensively validate the identity fields
//! 2. Resolve the effective channel and priority from user preferences
//! 3. Persist the transaction in `PENDING`
//! 4. Enqueue a delivery job on the tier the priority selects
//!
//! A request that cannot be enqueued — broker failure or an unready
//! provider — rolls the row forward to `DEAD_LETTER` with a synthetic error
//! log rather than stranding it in `PENDING`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::task::JoinSet;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{Channel, ErrorKind, Job, NotificationType, Priority};
use courier_providers::{NOT_CONFIGURED_CODE, ProviderRegistry};

use crate::preferences::PreferenceStore;
use crate::queue::{JobOptions, PRIORITY_QUEUE, QueueBroker, REGULAR_QUEUE};
use crate::store::{CreateTransactionParams, ErrorLogStore, NewErrorLog, TransactionStore};

/// Bulk submissions fan out in batches of this size, with a barrier between
/// batches.
pub const BULK_BATCH_SIZE: usize = 50;

/// A validated-at-the-boundary notification request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub user_id: String,
    pub notification_type: NotificationType,
    #[serde(default)]
    pub channel: Option<Channel>,
    pub content: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub recipient: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// What the submitter gets back: the handle to track the transaction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub transaction_id: Uuid,
    pub channel: Channel,
    pub priority: Priority,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItemResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<Uuid>,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReceipt {
    pub total: usize,
    pub queued: usize,
    pub failed: usize,
    pub results: Vec<BulkItemResult>,
}

/// Retry policy applied to every created transaction.
#[derive(Debug, Clone)]
pub struct DispatchDefaults {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub backoff_multiplier: u32,
}

/// The submission half of the pipeline. Collaborators are wired in at
/// construction; there is no ambient service locator.
#[derive(Clone)]
pub struct Dispatcher {
    pool: PgPool,
    broker: QueueBroker,
    providers: Arc<ProviderRegistry>,
    defaults: DispatchDefaults,
}

impl Dispatcher {
    pub fn new(
        pool: PgPool,
        broker: QueueBroker,
        providers: Arc<ProviderRegistry>,
        defaults: DispatchDefaults,
    ) -> Self {
        Self { pool, broker, providers, defaults }
    }

    /// Submit one notification. Returns once the transaction is durable and
    /// queued; delivery itself is asynchronous.
    pub async fn submit(&self, req: SubmitRequest) -> Result<SubmitReceipt, AppError> {
        validate(&req)?;

        let prefs = PreferenceStore::get_or_create(&self.pool, &req.user_id).await?;
        let channel = resolve_channel(req.channel, &prefs.preferred_channels());
        let priority = resolve_priority(req.priority, prefs.channel_priority(channel));

        let tx = TransactionStore::create(
            &self.pool,
            &CreateTransactionParams {
                user_id: req.user_id.clone(),
                notification_type: req.notification_type,
                channel,
                content: req.content.clone(),
                subject: req.subject.clone(),
                recipient: req.recipient.clone(),
                metadata: req.metadata.clone().unwrap_or_else(|| serde_json::json!({})),
                priority,
                max_retries: self.defaults.max_retries as i32,
            },
        )
        .await?;

        // A provider without credentials can never deliver; refuse up front
        // but leave the audit trail
        let provider = self.providers.get(channel);
        if !provider.ready() {
            let reason = format!("{} provider is not configured", channel);
            ErrorLogStore::append(
                &self.pool,
                &NewErrorLog {
                    transaction_id: tx.transaction_id,
                    error_type: ErrorKind::InvalidData,
                    error_message: reason.clone(),
                    error_stack: None,
                    error_code: Some(NOT_CONFIGURED_CODE.to_string()),
                    retryable: false,
                    provider_response: None,
                },
            )
            .await?;
            TransactionStore::mark_dead_letter(&self.pool, tx.transaction_id, &reason).await?;

            return Err(AppError::Validation(reason));
        }

        let queue = queue_for_priority(priority);
        let job = Job::from_transaction(&tx);
        let opts = JobOptions {
            priority,
            attempts: self.defaults.max_retries + 1,
            backoff_base_ms: self.defaults.retry_delay_ms,
            backoff_multiplier: self.defaults.backoff_multiplier,
        };

        if let Err(enqueue_err) = self.broker.enqueue(queue, &job, &opts).await {
            // Mandated roll-forward: never leave the row stranded in PENDING
            let reason = "failed to enqueue delivery job".to_string();
            ErrorLogStore::append(
                &self.pool,
                &NewErrorLog {
                    transaction_id: tx.transaction_id,
                    error_type: ErrorKind::NonRetryable,
                    error_message: format!("{reason}: {enqueue_err}"),
                    error_stack: None,
                    error_code: Some("QUEUE_ENQUEUE_FAILED".to_string()),
                    retryable: false,
                    provider_response: None,
                },
            )
            .await?;
            TransactionStore::mark_dead_letter(&self.pool, tx.transaction_id, &reason).await?;

            tracing::error!(
                transaction_id = %tx.transaction_id,
                error = %enqueue_err,
                "Enqueue failed, transaction dead-lettered"
            );
            return Err(enqueue_err);
        }

        TransactionStore::mark_queued(&self.pool, tx.transaction_id).await?;

        tracing::info!(
            transaction_id = %tx.transaction_id,
            user_id = %req.user_id,
            channel = %channel,
            priority = %priority,
            queue,
            "Notification queued"
        );

        Ok(SubmitReceipt { transaction_id: tx.transaction_id, channel, priority })
    }

    /// Submit many notifications, fanning out in bounded batches and
    /// awaiting each batch before starting the next. Per-item failures are
    /// collected, never propagated.
    pub async fn submit_bulk(&self, requests: Vec<SubmitRequest>) -> BulkReceipt {
        let total = requests.len();
        let user_ids: Vec<String> = requests.iter().map(|r| r.user_id.clone()).collect();
        let mut results: Vec<Option<BulkItemResult>> = Vec::with_capacity(total);
        results.resize_with(total, || None);

        let indexed: Vec<(usize, SubmitRequest)> = requests.into_iter().enumerate().collect();

        for (batch_index, batch) in indexed.chunks(BULK_BATCH_SIZE).enumerate() {
            let mut set = JoinSet::new();

            for (index, req) in batch.iter().cloned() {
                let dispatcher = self.clone();
                set.spawn(async move {
                    let user_id = req.user_id.clone();
                    let outcome = dispatcher.submit(req).await;
                    (index, user_id, outcome)
                });
            }

            // Barrier: the whole batch settles before the next one starts
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((index, user_id, Ok(receipt))) => {
                        results[index] = Some(BulkItemResult {
                            success: true,
                            transaction_id: Some(receipt.transaction_id),
                            user_id,
                            error: None,
                        });
                    }
                    Ok((index, user_id, Err(err))) => {
                        results[index] = Some(BulkItemResult {
                            success: false,
                            transaction_id: None,
                            user_id,
                            error: Some(client_error_message(&err)),
                        });
                    }
                    Err(join_err) => {
                        tracing::error!(batch = batch_index, error = %join_err, "Bulk submit task failed");
                    }
                }
            }
        }

        // Slots left empty by a crashed task still produce a per-item result
        let results: Vec<BulkItemResult> = results
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| BulkItemResult {
                    success: false,
                    transaction_id: None,
                    user_id: user_ids[index].clone(),
                    error: Some("internal error".to_string()),
                })
            })
            .collect();

        let queued = results.iter().filter(|r| r.success).count();
        let failed = total - queued;

        tracing::info!(total, queued, failed, "Bulk submission complete");

        BulkReceipt { total, queued, failed, results }
    }
}

fn validate(req: &SubmitRequest) -> Result<(), AppError> {
    if req.user_id.trim().is_empty() {
        return Err(AppError::Validation("userId is required".to_string()));
    }
    if req.content.trim().is_empty() {
        return Err(AppError::Validation("content is required".to_string()));
    }
    if req.recipient.trim().is_empty() {
        return Err(AppError::Validation("recipient is required".to_string()));
    }
    Ok(())
}

/// Requested channel wins; otherwise the first preferred channel; EMAIL as
/// the last resort when every channel is disabled.
fn resolve_channel(requested: Option<Channel>, preferred: &[Channel]) -> Channel {
    requested
        .or_else(|| preferred.first().copied())
        .unwrap_or(Channel::Email)
}

/// Requested priority wins; otherwise the channel's stored default.
fn resolve_priority(requested: Option<Priority>, channel_default: Priority) -> Priority {
    requested.unwrap_or(channel_default)
}

/// HIGH and URGENT route to the priority queue.
pub fn queue_for_priority(priority: Priority) -> &'static str {
    if priority >= Priority::High { PRIORITY_QUEUE } else { REGULAR_QUEUE }
}

/// Per-item error text for bulk responses: validation messages pass
/// through, internals do not.
fn client_error_message(err: &AppError) -> String {
    match err {
        AppError::Validation(msg) => msg.clone(),
        _ => "failed to queue notification".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_channel_wins() {
        let preferred = vec![Channel::Whatsapp, Channel::Push];
        assert_eq!(resolve_channel(Some(Channel::Sms), &preferred), Channel::Sms);
    }

    #[test]
    fn test_first_preferred_channel_used() {
        let preferred = vec![Channel::Whatsapp, Channel::Push];
        assert_eq!(resolve_channel(None, &preferred), Channel::Whatsapp);
    }

    #[test]
    fn test_email_fallback_when_nothing_enabled() {
        assert_eq!(resolve_channel(None, &[]), Channel::Email);
    }

    #[test]
    fn test_requested_priority_wins() {
        assert_eq!(resolve_priority(Some(Priority::Urgent), Priority::Low), Priority::Urgent);
    }

    #[test]
    fn test_channel_default_priority_used() {
        assert_eq!(resolve_priority(None, Priority::High), Priority::High);
    }

    #[test]
    fn test_queue_routing_boundary() {
        // Exactly HIGH goes to the priority queue, MEDIUM does not
        assert_eq!(queue_for_priority(Priority::High), PRIORITY_QUEUE);
        assert_eq!(queue_for_priority(Priority::Urgent), PRIORITY_QUEUE);
        assert_eq!(queue_for_priority(Priority::Medium), REGULAR_QUEUE);
        assert_eq!(queue_for_priority(Priority::Low), REGULAR_QUEUE);
    }

    #[test]
    fn test_validation_rejects_blank_fields() {
        let req = SubmitRequest {
            user_id: "  ".to_string(),
            notification_type: NotificationType::Transactional,
            channel: None,
            content: "hi".to_string(),
            subject: None,
            recipient: "a@b.c".to_string(),
            priority: None,
            metadata: None,
        };
        assert!(matches!(validate(&req), Err(AppError::Validation(_))));
    }
}
