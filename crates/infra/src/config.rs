//! Environment-driven settings shared by the gateway and worker binaries.
//!
//! Each group is a `clap::Args` so binaries flatten only what they need. Every
//! field can be given as a flag or through its environment variable.

use std::time::Duration;

use clap::Args;

use crate::workers::WorkerConfig;

/// Fallback consumer name when neither `REDIS_CONSUMER` nor a hostname is available.
pub const FALLBACK_CONSUMER: &str = "worker-1";

#[derive(Debug, Clone, Args)]
pub struct QueueArgs {
    /// Redis connection URL.
    #[arg(long, env = "REDIS_URL", default_value = "redis://localhost:6379/0")]
    pub redis_url: String,

    /// Stream carrying job messages.
    #[arg(long = "stream", env = "REDIS_STREAM", default_value = "jobs")]
    pub stream: String,
}

#[derive(Debug, Clone, Args)]
pub struct DatabaseArgs {
    /// Postgres connection URL.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Args)]
pub struct WorkerArgs {
    /// Consumer group shared by all workers.
    #[arg(long = "group", env = "REDIS_GROUP", default_value = "segment_group")]
    pub group: String,

    /// This worker's consumer name (defaults to the hostname).
    #[arg(long = "consumer", env = "REDIS_CONSUMER")]
    pub consumer: Option<String>,

    /// Max time one read blocks waiting for new entries.
    #[arg(long, env = "STREAM_BLOCK_MS", default_value_t = 5_000)]
    pub block_ms: u64,

    /// Pending deliveries idle at least this long are reclaimed.
    #[arg(long, env = "CLAIM_IDLE_MS", default_value_t = 60_000)]
    pub claim_idle_ms: u64,

    /// Max pending entries inspected per reclaim pass.
    #[arg(long, env = "CLAIM_COUNT", default_value_t = 10)]
    pub claim_count: usize,

    #[arg(long, env = "SLEEP_ON_EMPTY_MS", default_value_t = 200)]
    pub sleep_on_empty_ms: u64,
}

impl WorkerArgs {
    pub fn consumer_name(&self) -> String {
        self.consumer
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(default_consumer_name)
    }

    pub fn to_config(&self, stream: &str) -> WorkerConfig {
        WorkerConfig {
            stream: stream.to_string(),
            group: self.group.clone(),
            consumer: self.consumer_name(),
            block_timeout: Duration::from_millis(self.block_ms),
            claim_idle: Duration::from_millis(self.claim_idle_ms),
            claim_count: self.claim_count,
            idle_sleep: Duration::from_millis(self.sleep_on_empty_ms),
        }
    }
}

/// `HOSTNAME` from the environment, else the OS hostname, else [`FALLBACK_CONSUMER`].
pub fn default_consumer_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| hostname::get().ok().and_then(|h| h.into_string().ok()))
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| FALLBACK_CONSUMER.to_string())
}
