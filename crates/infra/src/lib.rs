//! Infrastructure layer: job store, queue transport, dispatch and workers.

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod job_store;
pub mod queue;
pub mod workers;

pub use context::{ContextError, PipelineContext};
pub use dispatcher::{DispatchError, Dispatcher, Submitted};

#[cfg(test)]
mod integration_tests;
