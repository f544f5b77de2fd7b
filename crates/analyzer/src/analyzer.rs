use std::sync::Arc;

use textq_core::AnalysisResult;

/// Analyzer failure. Surfaces on the job as `status=error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyzerError {
    #[error("analysis failed: {0}")]
    Failed(String),
}

impl AnalyzerError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Maps text to sentence and token spans.
///
/// Implementations must be deterministic: the same text always yields the same
/// result, which is what makes duplicate result writes harmless.
pub trait Analyzer: Send + Sync {
    fn analyze(&self, text: &str) -> Result<AnalysisResult, AnalyzerError>;
}

impl<A: Analyzer + ?Sized> Analyzer for Arc<A> {
    fn analyze(&self, text: &str) -> Result<AnalysisResult, AnalyzerError> {
        (**self).analyze(text)
    }
}

impl<A: Analyzer + ?Sized> Analyzer for Box<A> {
    fn analyze(&self, text: &str) -> Result<AnalysisResult, AnalyzerError> {
        (**self).analyze(text)
    }
}
