use std::sync::Arc;

use textq_infra::job_store::JobStore;
use textq_infra::{Dispatcher, PipelineContext};

/// Everything the handlers need, shared behind an `Arc` extension.
#[derive(Clone)]
pub struct AppServices {
    pub dispatcher: Dispatcher,
    pub store: Arc<dyn JobStore>,
    pub max_text_bytes: usize,
}

impl AppServices {
    pub fn from_context(ctx: &PipelineContext, max_text_bytes: usize) -> Self {
        Self {
            dispatcher: ctx.dispatcher(),
            store: ctx.store.clone(),
            max_text_bytes,
        }
    }
}
