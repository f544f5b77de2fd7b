//! Background consumers.

pub mod job_worker;
pub mod reclaimer;

pub use job_worker::{
    DeliveryOutcome, JobWorker, ProcessingError, WorkerConfig, WorkerError, WorkerStats,
    WorkerStatsSnapshot,
};
pub use reclaimer::Reclaimer;
