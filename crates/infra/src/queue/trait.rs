use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Stream-assigned message identifier (e.g. `1700000000000-0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for MessageId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One stream entry handed to a consumer. Pending until acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: MessageId,
    /// Raw value of the `payload` field; `None` when the entry has no such field.
    pub payload: Option<Vec<u8>>,
}

/// A pending (delivered, unacknowledged) entry as reported by the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub id: MessageId,
    pub consumer: String,
    /// Time since the entry was last delivered (or claimed).
    pub idle: Duration,
    pub delivery_count: u64,
}

/// Result of a group read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Deliveries(Vec<Delivery>),
    /// The block timeout elapsed without new entries.
    Empty,
}

impl ReadOutcome {
    pub fn into_deliveries(self) -> Vec<Delivery> {
        match self {
            ReadOutcome::Deliveries(d) => d,
            ReadOutcome::Empty => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("queue connection error: {0}")]
    Connection(String),

    #[error("queue command error: {0}")]
    Command(String),

    #[error("consumer group '{group}' does not exist on stream '{stream}'")]
    NoGroup { stream: String, group: String },

    #[error("queue reply could not be decoded: {0}")]
    Deserialization(String),
}

/// Append-only log with consumer-group delivery.
///
/// ## Delivery Model
///
/// - `read` hands each new entry to exactly one consumer of the group and
///   records it as pending for that consumer
/// - an entry stays pending until `ack`
/// - `claim` moves pending entries idle for at least `min_idle` to another
///   consumer; ownership is best-effort, not a lease
///
/// Delivery is at-least-once: consumers must be idempotent.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Create `group` on `stream` (creating the stream too). Existing groups are fine.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), QueueError>;

    /// Append an entry with `payload` stored under the `payload` field.
    async fn enqueue(&self, stream: &str, payload: &[u8]) -> Result<MessageId, QueueError>;

    /// Read up to `count` entries never delivered to `group`, waiting up to
    /// `block` for one to arrive. A zero `block` does not wait.
    async fn read(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<ReadOutcome, QueueError>;

    /// Oldest pending entries of the group, up to `count`.
    async fn list_pending(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> Result<Vec<PendingEntry>, QueueError>;

    /// Reassign the given pending entries to `consumer` if idle for at least
    /// `min_idle`. Returns the entries actually claimed.
    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[MessageId],
    ) -> Result<Vec<Delivery>, QueueError>;

    /// Remove an entry from the pending set. Returns whether it was pending.
    async fn ack(&self, stream: &str, group: &str, id: &MessageId) -> Result<bool, QueueError>;
}

#[async_trait]
impl<Q: Queue + ?Sized> Queue for Arc<Q> {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), QueueError> {
        (**self).ensure_group(stream, group).await
    }

    async fn enqueue(&self, stream: &str, payload: &[u8]) -> Result<MessageId, QueueError> {
        (**self).enqueue(stream, payload).await
    }

    async fn read(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<ReadOutcome, QueueError> {
        (**self).read(stream, group, consumer, count, block).await
    }

    async fn list_pending(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> Result<Vec<PendingEntry>, QueueError> {
        (**self).list_pending(stream, group, count).await
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[MessageId],
    ) -> Result<Vec<Delivery>, QueueError> {
        (**self).claim(stream, group, consumer, min_idle, ids).await
    }

    async fn ack(&self, stream: &str, group: &str, id: &MessageId) -> Result<bool, QueueError> {
        (**self).ack(stream, group, id).await
    }
}
