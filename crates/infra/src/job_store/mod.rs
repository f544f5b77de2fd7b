//! Job Store boundary.
//!
//! `JobStore` is the durable home of job state. The in-memory implementation
//! backs tests and local runs; the Postgres implementation is used in production.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryJobStore;
pub use postgres::PostgresJobStore;
pub use r#trait::{JobRecord, JobStore, StoreError};
