use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::queue::{Delivery, MessageId, Queue, QueueError};

/// Recovers deliveries left pending by consumers that died (or stalled)
/// between read and ack.
///
/// One pass: list up to `count` pending entries, keep those idle for at least
/// `min_idle`, claim them for `consumer`. Claimed deliveries are returned so
/// the caller can process them right away.
#[derive(Clone)]
pub struct Reclaimer {
    queue: Arc<dyn Queue>,
    stream: String,
    group: String,
    consumer: String,
    min_idle: Duration,
    count: usize,
}

impl Reclaimer {
    pub fn new(
        queue: Arc<dyn Queue>,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
        min_idle: Duration,
        count: usize,
    ) -> Self {
        Self {
            queue,
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
            min_idle,
            count,
        }
    }

    #[instrument(
        skip(self),
        fields(stream = %self.stream, group = %self.group, consumer = %self.consumer),
        err
    )]
    pub async fn reclaim(&self) -> Result<Vec<Delivery>, QueueError> {
        if self.count == 0 {
            return Ok(Vec::new());
        }

        let pending = self
            .queue
            .list_pending(&self.stream, &self.group, self.count)
            .await?;

        let stale: Vec<MessageId> = pending
            .into_iter()
            .filter(|p| p.idle >= self.min_idle)
            .inspect(|p| {
                debug!(
                    message_id = %p.id,
                    owner = %p.consumer,
                    idle_ms = p.idle.as_millis() as u64,
                    delivery_count = p.delivery_count,
                    "stale delivery"
                )
            })
            .map(|p| p.id)
            .collect();

        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let claimed = self
            .queue
            .claim(&self.stream, &self.group, &self.consumer, self.min_idle, &stale)
            .await?;

        info!(candidates = stale.len(), claimed = claimed.len(), "reclaimed stale deliveries");
        Ok(claimed)
    }
}
