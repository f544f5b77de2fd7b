//! Job submission (create row, then enqueue).
//!
//! ```text
//! text
//!   ↓
//! 1. fresh JobId
//!   ↓
//! 2. JobStore::create (status = queued)
//!   ↓
//! 3. Queue::enqueue {"job_id": ...}
//! ```
//!
//! The row always exists before the message, so any worker that sees the
//! message can resolve the text. The reverse is not guaranteed: if enqueue
//! fails (or the process dies between the two steps) the job stays `queued`
//! with no delivery. No compensation is attempted.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use textq_core::{JobId, JobMessage};

use crate::job_store::{JobStore, StoreError};
use crate::queue::{MessageId, Queue, QueueError};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Creating the job row failed; nothing was enqueued.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The row exists but the message could not be appended.
    #[error("job {job_id} created but not enqueued: {source}")]
    Enqueue {
        job_id: JobId,
        #[source]
        source: QueueError,
    },
}

/// Accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub job_id: JobId,
    pub message_id: MessageId,
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn Queue>,
    stream: String,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn Queue>, stream: impl Into<String>) -> Self {
        Self {
            store,
            queue,
            stream: stream.into(),
        }
    }

    /// Submit already-validated text. Returns the new job id.
    #[instrument(skip(self, text), fields(stream = %self.stream, text_bytes = text.len()), err)]
    pub async fn submit(&self, text: &str) -> Result<Submitted, DispatchError> {
        let job_id = JobId::new();
        self.store.create(job_id, text).await?;

        let message = JobMessage { job_id };
        let message_id = self
            .queue
            .enqueue(&self.stream, &message.encode())
            .await
            .map_err(|source| DispatchError::Enqueue { job_id, source })?;

        info!(%job_id, %message_id, "job submitted");
        Ok(Submitted { job_id, message_id })
    }
}
