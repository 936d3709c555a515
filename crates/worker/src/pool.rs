//! Bounded worker pools, one per queue.
//!
//! Each pool spawns `concurrency` independent reserve → process loops plus
//! one lease-reclaim tick. Pools watch a shared shutdown flag; on shutdown
//! each worker finishes its in-flight job and exits, and anything not
//! drained within the grace period is re-delivered via lease expiry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;

use courier_engine::queue::QueueBroker;

use crate::processor::JobProcessor;

/// Sleep between polls of an empty queue.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Sleep after a broker error before retrying the loop.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Interval between lease-reclaim sweeps.
const RECLAIM_INTERVAL: Duration = Duration::from_secs(30);

/// A pool of workers bound to one queue.
pub struct WorkerPool {
    queue: String,
    concurrency: usize,
    processor: JobProcessor,
    broker: QueueBroker,
}

impl WorkerPool {
    pub fn new(
        queue: impl Into<String>,
        concurrency: usize,
        processor: JobProcessor,
        broker: QueueBroker,
    ) -> Self {
        Self { queue: queue.into(), concurrency, processor, broker }
    }

    /// Spawn the pool's tasks into `tasks`. Returns immediately; the tasks
    /// run until the shutdown flag flips.
    pub fn spawn(self, tasks: &mut JoinSet<()>, shutdown: watch::Receiver<bool>) {
        let queue = Arc::new(self.queue);
        let processor = Arc::new(self.processor);

        tracing::info!(queue = %queue, concurrency = self.concurrency, "Starting worker pool");

        for worker_index in 0..self.concurrency {
            let queue = queue.clone();
            let processor = processor.clone();
            let broker = self.broker.clone();
            let shutdown = shutdown.clone();

            tasks.spawn(async move {
                worker_loop(&queue, worker_index, &processor, &broker, shutdown).await;
            });
        }

        let broker = self.broker.clone();
        let reclaim_queue = queue.clone();
        let reclaim_shutdown = shutdown.clone();
        tasks.spawn(async move {
            reclaim_loop(&reclaim_queue, &broker, reclaim_shutdown).await;
        });
    }
}

async fn worker_loop(
    queue: &str,
    worker_index: usize,
    processor: &JobProcessor,
    broker: &QueueBroker,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!(queue, worker_index, "Worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        match broker.reserve(queue).await {
            Ok(Some(delivery)) => {
                let transaction_id = delivery.job.transaction_id;
                if let Err(e) = processor.process(queue, &delivery).await {
                    // Leave the lease to expire; the broker re-delivers
                    tracing::error!(
                        queue,
                        transaction_id = %transaction_id,
                        error = %e,
                        "Job processing failed, awaiting lease expiry"
                    );
                }
            }
            Ok(None) => {
                // Empty queue: sleep, but wake immediately on shutdown
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                    _ = shutdown.changed() => {}
                }
            }
            Err(e) => {
                tracing::error!(queue, error = %e, "Failed to reserve job");
                tokio::select! {
                    _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
    }

    tracing::debug!(queue, worker_index, "Worker stopped");
}

async fn reclaim_loop(queue: &str, broker: &QueueBroker, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(RECLAIM_INTERVAL) => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        if let Err(e) = broker.reclaim_expired(queue).await {
            tracing::error!(queue, error = %e, "Lease reclaim sweep failed");
        }
    }
}
