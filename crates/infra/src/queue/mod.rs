//! Queue / consumer-group boundary.
//!
//! The core abstraction is transport-agnostic; `in_memory` serves tests and
//! local runs, `redis_streams` (feature `redis`) is the production transport
//! built on XADD / XREADGROUP / XPENDING / XCLAIM / XACK.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_streams;
pub mod r#trait;

pub use in_memory::InMemoryQueue;
#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsQueue;
pub use r#trait::{Delivery, MessageId, PendingEntry, Queue, QueueError, ReadOutcome};
