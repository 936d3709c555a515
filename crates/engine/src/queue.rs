//! Redis-backed queue broker.
//!
//! Three named queues — `regular`, `priority`, `dead-letter` — each built
//! from a small set of Redis structures:
//!
//! - `queue:{name}:ready`   sorted set; score encodes priority then FIFO
//!   sequence, so `ZPOPMIN` yields higher-priority jobs first and preserves
//!   enqueue order within a priority level
//! - `queue:{name}:delayed` sorted set; score is the epoch-millis instant a
//!   retry becomes due
//! - `queue:{name}:jobs`    hash of job id → payload; `HSETNX` keeps at most
//!   one live job per transaction id
//! - `queue:{name}:active`  sorted set of leased jobs; score is the lease
//!   deadline. Expired leases are returned to `ready`, giving at-least-once
//!   delivery across worker crashes
//! - `queue:{name}:completed` / `queue:{name}:failed` counters
//!
//! Delivery is at-least-once: consumers must tolerate re-delivery of jobs
//! whose transaction already reached a terminal state.

use chrono::Utc;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};

use courier_common::error::AppError;
use courier_common::types::{Job, Priority};

pub const REGULAR_QUEUE: &str = "regular";
pub const PRIORITY_QUEUE: &str = "priority";
pub const DEAD_LETTER_QUEUE: &str = "dead-letter";

/// Width of one priority level in the ready-set score space. The FIFO
/// sequence must stay below this for ordering to hold; a per-queue counter
/// would need ~31 years at one million enqueues per second to cross it.
const PRIORITY_BAND: f64 = 1e12;

/// Max delayed jobs promoted per reserve call.
const PROMOTE_BATCH: i64 = 100;

/// Default lease on a reserved job before it is considered abandoned.
const DEFAULT_LEASE_MS: u64 = 60_000;

/// Per-job scheduling options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOptions {
    pub priority: Priority,
    /// Upper bound on deliveries (initial attempt + retries). The database
    /// retry count is the authority; this only caps broker scheduling.
    pub attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_multiplier: u32,
}

impl JobOptions {
    /// Options for a dead-letter record: delivered at most once, no backoff.
    pub fn dead_letter(priority: Priority) -> Self {
        Self { priority, attempts: 1, backoff_base_ms: 0, backoff_multiplier: 1 }
    }
}

/// Stored payload: the job plus scheduling state.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueuedJob {
    job: Job,
    opts: JobOptions,
    attempts_made: u32,
}

/// A reserved job handed to a worker.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub job: Job,
    pub opts: JobOptions,
    /// Deliveries so far, including this one.
    pub attempts_made: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Handle on the broker; cheap to clone (the connection manager multiplexes).
#[derive(Clone)]
pub struct QueueBroker {
    redis: ConnectionManager,
    lease_ms: u64,
}

impl QueueBroker {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis, lease_ms: DEFAULT_LEASE_MS }
    }

    pub fn with_lease_ms(mut self, lease_ms: u64) -> Self {
        self.lease_ms = lease_ms;
        self
    }

    /// Enqueue a job. Returns `false` when a live job with the same id is
    /// already in the queue (the transaction id is the job id, so this is
    /// the at-most-one-in-flight guarantee).
    pub async fn enqueue(&self, queue: &str, job: &Job, opts: &JobOptions) -> Result<bool, AppError> {
        let mut conn = self.redis.clone();
        let job_id = job.transaction_id.to_string();
        let payload = encode(&QueuedJob { job: job.clone(), opts: opts.clone(), attempts_made: 0 })?;

        let stored: i64 = redis::cmd("HSETNX")
            .arg(key(queue, "jobs"))
            .arg(&job_id)
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        if stored == 0 {
            tracing::debug!(queue, job_id = %job_id, "Job already in flight, enqueue skipped");
            return Ok(false);
        }

        let seq: i64 = redis::cmd("INCR")
            .arg(key(queue, "seq"))
            .query_async(&mut conn)
            .await?;

        let _: i64 = redis::cmd("ZADD")
            .arg(key(queue, "ready"))
            .arg(priority_score(opts.priority, seq))
            .arg(&job_id)
            .query_async(&mut conn)
            .await?;

        tracing::debug!(
            queue,
            job_id = %job_id,
            priority = %opts.priority,
            "Job enqueued"
        );

        Ok(true)
    }

    /// Pull the next job: promote due retries, then pop the best-scored
    /// ready job and lease it. Returns `None` when the queue is empty.
    pub async fn reserve(&self, queue: &str) -> Result<Option<Delivery>, AppError> {
        let mut conn = self.redis.clone();
        self.promote_due(queue, &mut conn).await?;

        loop {
            let popped: Vec<(String, f64)> = redis::cmd("ZPOPMIN")
                .arg(key(queue, "ready"))
                .arg(1)
                .query_async(&mut conn)
                .await?;

            let Some((job_id, _score)) = popped.into_iter().next() else {
                return Ok(None);
            };

            let payload: Option<String> = redis::cmd("HGET")
                .arg(key(queue, "jobs"))
                .arg(&job_id)
                .query_async(&mut conn)
                .await?;

            // Payload removed by an ack that raced the pop; skip the orphan
            let Some(payload) = payload else { continue };

            let mut queued: QueuedJob = decode(&payload)?;
            queued.attempts_made += 1;

            let _: i64 = redis::cmd("HSET")
                .arg(key(queue, "jobs"))
                .arg(&job_id)
                .arg(encode(&queued)?)
                .query_async(&mut conn)
                .await?;

            let deadline = now_ms() + self.lease_ms as i64;
            let _: i64 = redis::cmd("ZADD")
                .arg(key(queue, "active"))
                .arg(deadline as f64)
                .arg(&job_id)
                .query_async(&mut conn)
                .await?;

            return Ok(Some(Delivery {
                job: queued.job,
                opts: queued.opts,
                attempts_made: queued.attempts_made,
            }));
        }
    }

    /// Acknowledge successful processing: the job leaves the broker.
    pub async fn ack(&self, queue: &str, job_id: &str) -> Result<(), AppError> {
        let mut conn = self.redis.clone();

        let _: i64 = redis::cmd("ZREM")
            .arg(key(queue, "active"))
            .arg(job_id)
            .query_async(&mut conn)
            .await?;
        let _: i64 = redis::cmd("HDEL")
            .arg(key(queue, "jobs"))
            .arg(job_id)
            .query_async(&mut conn)
            .await?;
        let _: i64 = redis::cmd("INCR")
            .arg(key(queue, "completed"))
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    /// Reschedule a leased job after `delay_ms`; the payload (with its
    /// bumped attempt count) stays in the jobs hash.
    pub async fn retry(&self, queue: &str, job_id: &str, delay_ms: u64) -> Result<(), AppError> {
        let mut conn = self.redis.clone();

        let _: i64 = redis::cmd("ZREM")
            .arg(key(queue, "active"))
            .arg(job_id)
            .query_async(&mut conn)
            .await?;

        let due_at = now_ms() + delay_ms as i64;
        let _: i64 = redis::cmd("ZADD")
            .arg(key(queue, "delayed"))
            .arg(due_at as f64)
            .arg(job_id)
            .query_async(&mut conn)
            .await?;

        tracing::debug!(queue, job_id, delay_ms, "Job scheduled for retry");
        Ok(())
    }

    /// Remove a job terminally on the failure path.
    pub async fn bury(&self, queue: &str, job_id: &str) -> Result<(), AppError> {
        let mut conn = self.redis.clone();

        let _: i64 = redis::cmd("ZREM")
            .arg(key(queue, "active"))
            .arg(job_id)
            .query_async(&mut conn)
            .await?;
        let _: i64 = redis::cmd("HDEL")
            .arg(key(queue, "jobs"))
            .arg(job_id)
            .query_async(&mut conn)
            .await?;
        let _: i64 = redis::cmd("INCR")
            .arg(key(queue, "failed"))
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    /// Return jobs whose lease expired to the ready set. Called
    /// periodically; this is what makes delivery at-least-once across
    /// worker crashes.
    pub async fn reclaim_expired(&self, queue: &str) -> Result<u64, AppError> {
        let mut conn = self.redis.clone();
        let now = now_ms() as f64;

        let expired: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(key(queue, "active"))
            .arg("-inf")
            .arg(now)
            .arg("LIMIT")
            .arg(0)
            .arg(PROMOTE_BATCH)
            .query_async(&mut conn)
            .await?;

        let mut reclaimed = 0u64;
        for job_id in expired {
            let removed: i64 = redis::cmd("ZREM")
                .arg(key(queue, "active"))
                .arg(&job_id)
                .query_async(&mut conn)
                .await?;
            // Another reclaimer beat us to it
            if removed == 0 {
                continue;
            }

            if self.requeue_ready(queue, &mut conn, &job_id).await? {
                reclaimed += 1;
            }
        }

        if reclaimed > 0 {
            tracing::warn!(queue, reclaimed, "Reclaimed expired job leases");
        }

        Ok(reclaimed)
    }

    pub async fn stats(&self, queue: &str) -> Result<QueueStats, AppError> {
        let mut conn = self.redis.clone();

        let ready: u64 = redis::cmd("ZCARD")
            .arg(key(queue, "ready"))
            .query_async(&mut conn)
            .await?;
        let delayed: u64 = redis::cmd("ZCARD")
            .arg(key(queue, "delayed"))
            .query_async(&mut conn)
            .await?;
        let active: u64 = redis::cmd("ZCARD")
            .arg(key(queue, "active"))
            .query_async(&mut conn)
            .await?;
        let completed: Option<u64> = redis::cmd("GET")
            .arg(key(queue, "completed"))
            .query_async(&mut conn)
            .await?;
        let failed: Option<u64> = redis::cmd("GET")
            .arg(key(queue, "failed"))
            .query_async(&mut conn)
            .await?;

        Ok(QueueStats {
            waiting: ready + delayed,
            active,
            completed: completed.unwrap_or(0),
            failed: failed.unwrap_or(0),
        })
    }

    /// Move due delayed jobs into the ready set.
    async fn promote_due(&self, queue: &str, conn: &mut ConnectionManager) -> Result<(), AppError> {
        let now = now_ms() as f64;

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(key(queue, "delayed"))
            .arg("-inf")
            .arg(now)
            .arg("LIMIT")
            .arg(0)
            .arg(PROMOTE_BATCH)
            .query_async(conn)
            .await?;

        for job_id in due {
            let removed: i64 = redis::cmd("ZREM")
                .arg(key(queue, "delayed"))
                .arg(&job_id)
                .query_async(conn)
                .await?;
            // Another worker promoted it first
            if removed == 0 {
                continue;
            }

            self.requeue_ready(queue, conn, &job_id).await?;
        }

        Ok(())
    }

    /// Re-add a job id to the ready set at its stored priority. Returns
    /// `false` when the payload no longer exists.
    async fn requeue_ready(
        &self,
        queue: &str,
        conn: &mut ConnectionManager,
        job_id: &str,
    ) -> Result<bool, AppError> {
        let payload: Option<String> = redis::cmd("HGET")
            .arg(key(queue, "jobs"))
            .arg(job_id)
            .query_async(conn)
            .await?;

        let Some(payload) = payload else {
            return Ok(false);
        };
        let queued: QueuedJob = decode(&payload)?;

        let seq: i64 = redis::cmd("INCR")
            .arg(key(queue, "seq"))
            .query_async(conn)
            .await?;
        let _: i64 = redis::cmd("ZADD")
            .arg(key(queue, "ready"))
            .arg(priority_score(queued.opts.priority, seq))
            .arg(job_id)
            .query_async(conn)
            .await?;

        Ok(true)
    }
}

fn key(queue: &str, part: &str) -> String {
    format!("queue:{queue}:{part}")
}

/// Lower score pops first: URGENT lands in band 0, LOW in band 3, with the
/// enqueue sequence breaking ties FIFO inside a band.
fn priority_score(priority: Priority, seq: i64) -> f64 {
    (4 - priority.as_i32()) as f64 * PRIORITY_BAND + seq as f64
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn encode(job: &QueuedJob) -> Result<String, AppError> {
    serde_json::to_string(job).map_err(|e| AppError::Queue(format!("failed to encode job: {e}")))
}

fn decode(payload: &str) -> Result<QueuedJob, AppError> {
    serde_json::from_str(payload).map_err(|e| AppError::Queue(format!("failed to decode job: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_higher_priority_scores_lower() {
        assert!(priority_score(Priority::Urgent, 10) < priority_score(Priority::High, 1));
        assert!(priority_score(Priority::High, 10) < priority_score(Priority::Medium, 1));
        assert!(priority_score(Priority::Medium, 10) < priority_score(Priority::Low, 1));
    }

    #[test]
    fn test_fifo_within_priority_level() {
        assert!(priority_score(Priority::Medium, 1) < priority_score(Priority::Medium, 2));
        assert!(priority_score(Priority::Urgent, 5) < priority_score(Priority::Urgent, 6));
    }

    #[test]
    fn test_sequence_never_crosses_band() {
        // A week of enqueues at 1M/s stays far inside one band
        let seq = 1_000_000i64 * 86_400 * 7;
        assert!(priority_score(Priority::Urgent, seq) < priority_score(Priority::High, 0));
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(key("regular", "ready"), "queue:regular:ready");
        assert_eq!(key("dead-letter", "jobs"), "queue:dead-letter:jobs");
    }

    #[test]
    fn test_dead_letter_options_single_attempt() {
        let opts = JobOptions::dead_letter(Priority::Low);
        assert_eq!(opts.attempts, 1);
        assert_eq!(opts.backoff_base_ms, 0);
    }
}
