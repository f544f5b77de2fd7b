//! Redis Streams-backed queue (durable, at-least-once delivery).
//!
//! ## Commands
//!
//! - `ensure_group`: `XGROUP CREATE <stream> <group> 0 MKSTREAM` (`BUSYGROUP` is success)
//! - `enqueue`: `XADD <stream> * payload <bytes>`
//! - `read`: `XREADGROUP GROUP <group> <consumer> COUNT n [BLOCK ms] STREAMS <stream> >`
//! - `list_pending`: `XPENDING <stream> <group> - + n`
//! - `claim`: `XCLAIM <stream> <group> <consumer> <min-idle-ms> <id>...`
//! - `ack`: `XACK <stream> <group> <id>`
//!
//! Groups start at `0` rather than `$` (the usual "new entries only"
//! position), so entries appended before the first worker came up are still
//! delivered.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply,
};
use tracing::{debug, instrument};

use textq_core::PAYLOAD_FIELD;

use super::r#trait::{Delivery, MessageId, PendingEntry, Queue, QueueError, ReadOutcome};

#[derive(Clone)]
pub struct RedisStreamsQueue {
    conn: ConnectionManager,
}

impl core::fmt::Debug for RedisStreamsQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisStreamsQueue").finish_non_exhaustive()
    }
}

impl RedisStreamsQueue {
    /// Connect to Redis (e.g. `redis://localhost:6379/0`).
    ///
    /// The connection manager reconnects on its own after drops.
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::Connection(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }
}

/// Map a Redis error into a `QueueError`.
///
/// ## Mapping
///
/// - `NOGROUP` reply → `NoGroup`
/// - dropped connection / IO failure → `Connection`
/// - reply type mismatch → `Deserialization`
/// - everything else → `Command`
fn map_redis_error(command: &str, stream: &str, group: &str, err: redis::RedisError) -> QueueError {
    if err.code() == Some("NOGROUP") {
        return QueueError::NoGroup {
            stream: stream.to_string(),
            group: group.to_string(),
        };
    }
    if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
        return QueueError::Connection(format!("{command} failed: {err}"));
    }
    if err.kind() == redis::ErrorKind::TypeError {
        return QueueError::Deserialization(format!("{command} reply: {err}"));
    }
    QueueError::Command(format!("{command} failed: {err}"))
}

fn to_delivery(entry: StreamId) -> Delivery {
    let payload = entry
        .map
        .get(PAYLOAD_FIELD)
        .and_then(|v| redis::from_redis_value::<Vec<u8>>(v).ok());
    Delivery {
        id: MessageId::new(entry.id),
        payload,
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl Queue for RedisStreamsQueue {
    #[instrument(skip(self), err)]
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(stream, group, "consumer group already exists");
                Ok(())
            }
            Err(e) => Err(map_redis_error("XGROUP CREATE", stream, group, e)),
        }
    }

    #[instrument(skip(self, payload), fields(payload_len = payload.len()), err)]
    async fn enqueue(&self, stream: &str, payload: &[u8]) -> Result<MessageId, QueueError> {
        let mut conn = self.conn.clone();
        let id: String = redis::cmd("XADD")
            .arg(stream)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("XADD", stream, "", e))?;
        Ok(MessageId::new(id))
    }

    async fn read(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<ReadOutcome, QueueError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count.max(1));
        // BLOCK 0 means "forever" to Redis; a zero timeout here means "don't wait".
        if !block.is_zero() {
            cmd.arg("BLOCK").arg(duration_ms(block));
        }
        cmd.arg("STREAMS").arg(stream).arg(">");

        let reply: Option<StreamReadReply> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("XREADGROUP", stream, group, e))?;

        let deliveries: Vec<Delivery> = reply
            .map(|r| r.keys)
            .unwrap_or_default()
            .into_iter()
            .filter(|k| k.key == stream)
            .flat_map(|k| k.ids)
            .map(to_delivery)
            .collect();

        if deliveries.is_empty() {
            Ok(ReadOutcome::Empty)
        } else {
            Ok(ReadOutcome::Deliveries(deliveries))
        }
    }

    #[instrument(skip(self), err)]
    async fn list_pending(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> Result<Vec<PendingEntry>, QueueError> {
        let mut conn = self.conn.clone();
        let reply: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(stream)
            .arg(group)
            .arg("-")
            .arg("+")
            .arg(count.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("XPENDING", stream, group, e))?;

        Ok(reply
            .ids
            .into_iter()
            .map(|p| PendingEntry {
                id: MessageId::new(p.id),
                consumer: p.consumer,
                idle: Duration::from_millis(p.last_delivered_ms as u64),
                delivery_count: p.times_delivered as u64,
            })
            .collect())
    }

    #[instrument(skip(self, ids), fields(candidates = ids.len()), err)]
    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[MessageId],
    ) -> Result<Vec<Delivery>, QueueError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(stream)
            .arg(group)
            .arg(consumer)
            .arg(duration_ms(min_idle));
        for id in ids {
            cmd.arg(id.as_str());
        }

        let reply: StreamClaimReply = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("XCLAIM", stream, group, e))?;

        Ok(reply.ids.into_iter().map(to_delivery).collect())
    }

    async fn ack(&self, stream: &str, group: &str, id: &MessageId) -> Result<bool, QueueError> {
        let mut conn = self.conn.clone();
        let acked: i64 = redis::cmd("XACK")
            .arg(stream)
            .arg(group)
            .arg(id.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("XACK", stream, group, e))?;
        Ok(acked > 0)
    }
}
