use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::r#trait::{Delivery, MessageId, PendingEntry, Queue, QueueError, ReadOutcome};

#[derive(Debug)]
struct PendingState {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u64,
}

#[derive(Debug, Default)]
struct Group {
    /// Index of the next entry never delivered to this group.
    cursor: usize,
    /// Pending entries keyed by entry index.
    pending: BTreeMap<usize, PendingState>,
}

#[derive(Debug, Default)]
struct Stream {
    entries: Vec<Option<Vec<u8>>>,
    groups: HashMap<String, Group>,
}

/// In-memory consumer-group queue for tests/dev.
///
/// Mirrors the stream semantics the worker relies on: groups start at the
/// beginning of the stream (`0`, not `$`: entries appended before the group
/// existed are still delivered), reads hand out each entry once per group, pending
/// entries carry an idle clock and a delivery counter. Entry ids are `<n>-0`
/// with `n` starting at 1 per stream.
///
/// Idle time uses `tokio::time::Instant`, so paused-clock tests can step it.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    streams: Mutex<HashMap<String, Stream>>,
    appended: Notify,
}

fn entry_id(index: usize) -> MessageId {
    MessageId::new(format!("{}-0", index + 1))
}

fn entry_index(id: &MessageId) -> Option<usize> {
    let (ms, _) = id.as_str().split_once('-')?;
    ms.parse::<usize>().ok()?.checked_sub(1)
}

fn no_group(stream: &str, group: &str) -> QueueError {
    QueueError::NoGroup {
        stream: stream.to_string(),
        group: group.to_string(),
    }
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry with an arbitrary (possibly missing) payload field.
    ///
    /// Used to simulate malformed producers.
    pub fn append_raw(&self, stream: &str, payload: Option<Vec<u8>>) -> Result<MessageId, QueueError> {
        let id = {
            let mut streams = self.lock()?;
            let s = streams.entry(stream.to_string()).or_default();
            s.entries.push(payload);
            entry_id(s.entries.len() - 1)
        };
        self.appended.notify_waiters();
        Ok(id)
    }

    /// Forget `stream` with all its entries and groups, as a Redis restart
    /// without persistence would.
    pub fn drop_stream(&self, stream: &str) -> Result<bool, QueueError> {
        Ok(self.lock()?.remove(stream).is_some())
    }

    /// Number of entries appended to `stream`.
    pub fn len(&self, stream: &str) -> usize {
        self.lock()
            .map(|s| s.get(stream).map(|s| s.entries.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, stream: &str) -> bool {
        self.len(stream) == 0
    }

    /// Number of pending entries of `group`.
    pub fn pending_count(&self, stream: &str, group: &str) -> usize {
        self.lock()
            .ok()
            .and_then(|s| {
                s.get(stream)
                    .and_then(|s| s.groups.get(group))
                    .map(|g| g.pending.len())
            })
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Stream>>, QueueError> {
        self.streams
            .lock()
            .map_err(|_| QueueError::Command("queue lock poisoned".to_string()))
    }

    fn try_read(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<Delivery>, QueueError> {
        let mut streams = self.lock()?;
        let s = streams
            .get_mut(stream)
            .ok_or_else(|| no_group(stream, group))?;
        let g = s.groups.get_mut(group).ok_or_else(|| no_group(stream, group))?;

        let now = Instant::now();
        let end = s.entries.len().min(g.cursor.saturating_add(count.max(1)));
        let mut out = Vec::with_capacity(end.saturating_sub(g.cursor));
        for index in g.cursor..end {
            g.pending.insert(
                index,
                PendingState {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                    delivery_count: 1,
                },
            );
            out.push(Delivery {
                id: entry_id(index),
                payload: s.entries[index].clone(),
            });
        }
        g.cursor = end.max(g.cursor);
        Ok(out)
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), QueueError> {
        let mut streams = self.lock()?;
        streams
            .entry(stream.to_string())
            .or_default()
            .groups
            .entry(group.to_string())
            .or_default();
        Ok(())
    }

    async fn enqueue(&self, stream: &str, payload: &[u8]) -> Result<MessageId, QueueError> {
        self.append_raw(stream, Some(payload.to_vec()))
    }

    async fn read(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<ReadOutcome, QueueError> {
        // `None` when `block` is too large to represent: wait without a deadline.
        let deadline = Instant::now().checked_add(block);
        loop {
            // Register interest before checking so an append between the
            // check and the wait is not missed.
            let appended = self.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            let deliveries = self.try_read(stream, group, consumer, count)?;
            if !deliveries.is_empty() {
                return Ok(ReadOutcome::Deliveries(deliveries));
            }
            if block.is_zero() {
                return Ok(ReadOutcome::Empty);
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline
                        || tokio::time::timeout_at(deadline, appended).await.is_err()
                    {
                        return Ok(ReadOutcome::Empty);
                    }
                }
                None => appended.await,
            }
        }
    }

    async fn list_pending(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> Result<Vec<PendingEntry>, QueueError> {
        let streams = self.lock()?;
        let g = streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .ok_or_else(|| no_group(stream, group))?;

        let now = Instant::now();
        Ok(g.pending
            .iter()
            .take(count)
            .map(|(index, p)| PendingEntry {
                id: entry_id(*index),
                consumer: p.consumer.clone(),
                idle: now.saturating_duration_since(p.delivered_at),
                delivery_count: p.delivery_count,
            })
            .collect())
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[MessageId],
    ) -> Result<Vec<Delivery>, QueueError> {
        let mut streams = self.lock()?;
        let s = streams
            .get_mut(stream)
            .ok_or_else(|| no_group(stream, group))?;
        let g = s.groups.get_mut(group).ok_or_else(|| no_group(stream, group))?;

        let now = Instant::now();
        let mut claimed = Vec::new();
        for id in ids {
            let Some(index) = entry_index(id) else { continue };
            let Some(p) = g.pending.get_mut(&index) else { continue };
            if now.saturating_duration_since(p.delivered_at) < min_idle {
                continue;
            }
            p.consumer = consumer.to_string();
            p.delivered_at = now;
            p.delivery_count += 1;
            claimed.push(Delivery {
                id: id.clone(),
                payload: s.entries.get(index).cloned().flatten(),
            });
        }
        Ok(claimed)
    }

    async fn ack(&self, stream: &str, group: &str, id: &MessageId) -> Result<bool, QueueError> {
        let mut streams = self.lock()?;
        let Some(g) = streams.get_mut(stream).and_then(|s| s.groups.get_mut(group)) else {
            return Ok(false);
        };
        Ok(entry_index(id)
            .and_then(|index| g.pending.remove(&index))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = "jobs";
    const GROUP: &str = "segment_group";

    async fn queue_with_group() -> InMemoryQueue {
        let q = InMemoryQueue::new();
        q.ensure_group(STREAM, GROUP).await.unwrap();
        q
    }

    #[tokio::test]
    async fn read_hands_each_entry_to_one_consumer() {
        let q = queue_with_group().await;
        let id = q.enqueue(STREAM, b"one").await.unwrap();

        let first = q.read(STREAM, GROUP, "c1", 10, Duration::ZERO).await.unwrap();
        let second = q.read(STREAM, GROUP, "c2", 10, Duration::ZERO).await.unwrap();

        assert_eq!(
            first,
            ReadOutcome::Deliveries(vec![Delivery { id, payload: Some(b"one".to_vec()) }])
        );
        assert_eq!(second, ReadOutcome::Empty);
        assert_eq!(q.pending_count(STREAM, GROUP), 1);
    }

    #[tokio::test]
    async fn group_created_late_sees_backlog() {
        let q = InMemoryQueue::new();
        q.enqueue(STREAM, b"early").await.unwrap();
        q.ensure_group(STREAM, GROUP).await.unwrap();
        q.ensure_group(STREAM, GROUP).await.unwrap();

        let got = q.read(STREAM, GROUP, "c1", 10, Duration::ZERO).await.unwrap();
        assert_eq!(got.into_deliveries().len(), 1);
    }

    #[tokio::test]
    async fn read_respects_count() {
        let q = queue_with_group().await;
        for _ in 0..3 {
            q.enqueue(STREAM, b"x").await.unwrap();
        }
        let got = q.read(STREAM, GROUP, "c1", 2, Duration::ZERO).await.unwrap();
        let ids: Vec<_> = got.into_deliveries().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![MessageId::new("1-0"), MessageId::new("2-0")]);
    }

    #[tokio::test]
    async fn missing_group_is_reported() {
        let q = InMemoryQueue::new();
        let err = q.read(STREAM, GROUP, "c1", 1, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, QueueError::NoGroup { .. }));
        assert!(matches!(
            q.list_pending(STREAM, GROUP, 10).await,
            Err(QueueError::NoGroup { .. })
        ));
    }

    #[tokio::test]
    async fn ack_clears_pending_once() {
        let q = queue_with_group().await;
        let id = q.enqueue(STREAM, b"x").await.unwrap();
        q.read(STREAM, GROUP, "c1", 1, Duration::ZERO).await.unwrap();

        assert!(q.ack(STREAM, GROUP, &id).await.unwrap());
        assert!(!q.ack(STREAM, GROUP, &id).await.unwrap());
        assert_eq!(q.pending_count(STREAM, GROUP), 0);
    }

    #[tokio::test]
    async fn raw_entries_without_payload_are_delivered() {
        let q = queue_with_group().await;
        q.append_raw(STREAM, None).unwrap();
        let got = q.read(STREAM, GROUP, "c1", 1, Duration::ZERO).await.unwrap();
        assert_eq!(got.into_deliveries()[0].payload, None);
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_read_wakes_on_append() {
        let q = std::sync::Arc::new(queue_with_group().await);
        let reader = {
            let q = q.clone();
            tokio::spawn(async move {
                q.read(STREAM, GROUP, "c1", 1, Duration::from_secs(5)).await
            })
        };
        tokio::task::yield_now().await;
        q.enqueue(STREAM, b"late").await.unwrap();

        let got = reader.await.unwrap().unwrap();
        assert_eq!(got.into_deliveries().len(), 1);
    }

    #[tokio::test]
    async fn unbounded_block_waits_without_deadline() {
        let q = std::sync::Arc::new(queue_with_group().await);
        let reader = {
            let q = q.clone();
            tokio::spawn(async move { q.read(STREAM, GROUP, "c1", 1, Duration::MAX).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.enqueue(STREAM, b"eventually").await.unwrap();

        let got = reader.await.unwrap().unwrap();
        assert_eq!(got.into_deliveries()[0].payload.as_deref(), Some(&b"eventually"[..]));
    }

    #[tokio::test]
    async fn dropped_stream_loses_its_groups() {
        let q = queue_with_group().await;
        q.enqueue(STREAM, b"x").await.unwrap();

        assert!(q.drop_stream(STREAM).unwrap());
        assert!(q.is_empty(STREAM));
        q.enqueue(STREAM, b"y").await.unwrap();
        assert!(matches!(
            q.read(STREAM, GROUP, "c1", 1, Duration::ZERO).await,
            Err(QueueError::NoGroup { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_read_times_out_empty() {
        let q = queue_with_group().await;
        let got = q
            .read(STREAM, GROUP, "c1", 1, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(got, ReadOutcome::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn claim_honours_idle_threshold() {
        let q = queue_with_group().await;
        let id = q.enqueue(STREAM, b"x").await.unwrap();
        q.read(STREAM, GROUP, "crashed", 1, Duration::ZERO).await.unwrap();
        let min_idle = Duration::from_secs(60);

        tokio::time::advance(Duration::from_secs(59)).await;
        let early = q.claim(STREAM, GROUP, "rescuer", min_idle, &[id.clone()]).await.unwrap();
        assert!(early.is_empty());

        tokio::time::advance(Duration::from_secs(1)).await;
        let pending = q.list_pending(STREAM, GROUP, 10).await.unwrap();
        assert_eq!(pending[0].consumer, "crashed");
        assert!(pending[0].idle >= min_idle);

        let claimed = q.claim(STREAM, GROUP, "rescuer", min_idle, &[id.clone()]).await.unwrap();
        assert_eq!(claimed.len(), 1);

        let pending = q.list_pending(STREAM, GROUP, 10).await.unwrap();
        assert_eq!(pending[0].consumer, "rescuer");
        assert_eq!(pending[0].delivery_count, 2);
        assert_eq!(pending[0].idle, Duration::ZERO);
    }

    #[tokio::test]
    async fn claim_ignores_acknowledged_entries() {
        let q = queue_with_group().await;
        let id = q.enqueue(STREAM, b"x").await.unwrap();
        q.read(STREAM, GROUP, "c1", 1, Duration::ZERO).await.unwrap();
        q.ack(STREAM, GROUP, &id).await.unwrap();

        let claimed = q.claim(STREAM, GROUP, "c2", Duration::ZERO, &[id]).await.unwrap();
        assert!(claimed.is_empty());
    }
}
