//! The long-running job consumer.
//!
//! ## Loop
//!
//! ```text
//! ensure_group
//!   ↓
//! ┌→ reclaim stale deliveries → process each
//! │    ↓
//! │  read new (blocking, raced against cancellation) → process each
//! └────┘
//! ```
//!
//! A queue error backs off for `idle_sleep`; a missing group is recreated first.
//!
//! ## Per-delivery handling
//!
//! - payload does not decode → `Dropped`, no store action
//! - `mark_running` (best effort) → `fetch_text` → analyze → `save_result_and_done` → `Completed`
//! - any failure in that chain → `mark_error(job, message)` → `Failed`
//!
//! Every delivery is acknowledged after the attempt, whatever the outcome.
//! Failures are never retried here; only deliveries abandoned without an ack
//! (crashed consumer) come back, via reclaim.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use textq_analyzer::{Analyzer, AnalyzerError};
use textq_core::{JobId, JobMessage, PayloadError};

use crate::job_store::{JobStore, StoreError};
use crate::queue::{Delivery, Queue, QueueError, ReadOutcome};
use crate::workers::reclaimer::Reclaimer;

/// Worker loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub stream: String,
    pub group: String,
    pub consumer: String,
    /// How long one read waits for new entries.
    pub block_timeout: Duration,
    /// Pending deliveries idle at least this long are reclaimed.
    pub claim_idle: Duration,
    /// Max pending entries inspected per reclaim pass.
    pub claim_count: usize,
    /// Pause after a non-blocking empty read or a queue error.
    pub idle_sleep: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            stream: "jobs".to_string(),
            group: "segment_group".to_string(),
            consumer: "worker-1".to_string(),
            block_timeout: Duration::from_millis(5_000),
            claim_idle: Duration::from_millis(60_000),
            claim_count: 10,
            idle_sleep: Duration::from_millis(200),
        }
    }
}

/// Why processing a decoded job failed. Recorded on the job as `status=error`.
#[derive(Debug, Clone, Error)]
pub enum ProcessingError {
    #[error("job {0} not found")]
    JobMissing(JobId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
}

/// Result of handling one delivery. The delivery is acked in every case.
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    Completed(JobId),
    Failed { job_id: JobId, error: ProcessingError },
    /// Payload unusable; nothing was written.
    Dropped(PayloadError),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to prepare consumer group: {0}")]
    Setup(#[source] QueueError),
}

/// Running totals since start.
#[derive(Debug, Default)]
pub struct WorkerStats {
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    reclaimed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStatsSnapshot {
    pub completed: u64,
    pub failed: u64,
    pub dropped: u64,
    pub reclaimed: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &DeliveryOutcome) {
        let counter = match outcome {
            DeliveryOutcome::Completed(_) => &self.completed,
            DeliveryOutcome::Failed { .. } => &self.failed,
            DeliveryOutcome::Dropped(_) => &self.dropped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct JobWorker {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn Queue>,
    analyzer: Arc<dyn Analyzer>,
    reclaimer: Reclaimer,
    config: WorkerConfig,
    stats: Arc<WorkerStats>,
}

impl JobWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn Queue>,
        analyzer: Arc<dyn Analyzer>,
        config: WorkerConfig,
    ) -> Self {
        let reclaimer = Reclaimer::new(
            queue.clone(),
            config.stream.clone(),
            config.group.clone(),
            config.consumer.clone(),
            config.claim_idle,
            config.claim_count,
        );
        Self {
            store,
            queue,
            analyzer,
            reclaimer,
            config,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }

    /// Run until `cancel` fires.
    ///
    /// Only group setup is fatal; per-delivery and per-iteration failures are
    /// logged and the loop carries on.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), WorkerError> {
        let cfg = &self.config;
        self.queue
            .ensure_group(&cfg.stream, &cfg.group)
            .await
            .map_err(WorkerError::Setup)?;

        info!(
            stream = %cfg.stream,
            group = %cfg.group,
            consumer = %cfg.consumer,
            "worker started"
        );

        while !cancel.is_cancelled() {
            if let Err(e) = self.run_once(&cancel).await {
                warn!(error = %e, "queue call failed, backing off");
                // The group vanishes when Redis restarts without persistence.
                if matches!(e, QueueError::NoGroup { .. }) {
                    match self.queue.ensure_group(&cfg.stream, &cfg.group).await {
                        Ok(()) => info!(stream = %cfg.stream, group = %cfg.group, "consumer group recreated"),
                        Err(e) => warn!(error = %e, "could not recreate consumer group"),
                    }
                }
                if self.pause(&cancel, cfg.idle_sleep).await {
                    break;
                }
            }
        }

        info!(consumer = %cfg.consumer, "worker stopped");
        Ok(())
    }

    /// One iteration: reclaim, then read. Returns the number of deliveries handled.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<usize, QueueError> {
        let mut handled = 0;

        match self.reclaimer.reclaim().await {
            Ok(claimed) => {
                self.stats
                    .reclaimed
                    .fetch_add(claimed.len() as u64, Ordering::Relaxed);
                for delivery in claimed {
                    self.handle(delivery).await;
                    handled += 1;
                }
            }
            // A reclaim failure must not stop fresh work from being read.
            Err(e) => warn!(error = %e, "reclaim pass failed"),
        }

        let cfg = &self.config;
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Ok(handled),
            read = self.queue.read(&cfg.stream, &cfg.group, &cfg.consumer, 1, cfg.block_timeout) => read?,
        };

        match outcome {
            ReadOutcome::Deliveries(deliveries) => {
                for delivery in deliveries {
                    self.handle(delivery).await;
                    handled += 1;
                }
            }
            ReadOutcome::Empty => {
                // A blocking read already waited; only a non-blocking one needs a pause.
                if cfg.block_timeout.is_zero() && handled == 0 {
                    self.pause(cancel, cfg.idle_sleep).await;
                }
            }
        }
        Ok(handled)
    }

    /// Process one delivery and acknowledge it.
    #[instrument(skip(self, delivery), fields(message_id = %delivery.id, consumer = %self.config.consumer))]
    pub async fn handle(&self, delivery: Delivery) -> DeliveryOutcome {
        let outcome = self.process_delivery(&delivery).await;
        self.stats.record(&outcome);

        match &outcome {
            DeliveryOutcome::Completed(job_id) => info!(%job_id, "job done"),
            DeliveryOutcome::Failed { job_id, error } => {
                warn!(%job_id, error = %error, "job failed")
            }
            DeliveryOutcome::Dropped(e) => warn!(error = %e, "dropping malformed delivery"),
        }

        let cfg = &self.config;
        match self.queue.ack(&cfg.stream, &cfg.group, &delivery.id).await {
            Ok(true) => debug!("delivery acknowledged"),
            // Another consumer claimed (and may have acked) it meanwhile.
            Ok(false) => warn!("delivery was no longer pending at ack"),
            Err(e) => error!(error = %e, "ack failed; delivery stays pending until reclaimed"),
        }

        outcome
    }

    /// Decode and run the job without acknowledging.
    pub async fn process_delivery(&self, delivery: &Delivery) -> DeliveryOutcome {
        let job_id = match JobMessage::decode(delivery.payload.as_deref()) {
            Ok(message) => message.job_id,
            Err(e) => return DeliveryOutcome::Dropped(e),
        };

        match self.execute(job_id).await {
            Ok(()) => DeliveryOutcome::Completed(job_id),
            Err(error) => {
                if let Err(mark) = self.store.mark_error(job_id, &error.to_string()).await {
                    error!(%job_id, error = %mark, "could not record job failure");
                }
                DeliveryOutcome::Failed { job_id, error }
            }
        }
    }

    async fn execute(&self, job_id: JobId) -> Result<(), ProcessingError> {
        match self.store.mark_running(job_id).await {
            Ok(true) => {}
            Ok(false) => debug!(%job_id, "job not startable (missing or already terminal)"),
            Err(e) => warn!(%job_id, error = %e, "mark_running failed, continuing"),
        }

        let text = self
            .store
            .fetch_text(job_id)
            .await?
            .ok_or(ProcessingError::JobMissing(job_id))?;

        let result = self.analyzer.analyze(&text)?;
        self.store.save_result_and_done(job_id, &result).await?;
        Ok(())
    }

    /// Sleep unless cancelled first. Returns `true` when cancelled.
    async fn pause(&self, cancel: &CancellationToken, d: Duration) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(d) => false,
        }
    }
}
