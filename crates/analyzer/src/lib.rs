//! `textq-analyzer`: text segmentation capability.
//!
//! The worker only depends on the [`Analyzer`] trait; [`RuleSegmenter`] is the
//! default implementation. Analyzers are pure: no queue or store knowledge.

pub mod analyzer;
pub mod segmenter;
pub mod tokenizer;

pub use analyzer::{Analyzer, AnalyzerError};
pub use segmenter::RuleSegmenter;
