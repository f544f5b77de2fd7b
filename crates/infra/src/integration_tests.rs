//! End-to-end tests for the in-memory pipeline.
//!
//! Tests: Dispatcher → JobStore → Queue → JobWorker → Analyzer → JobStore
//!
//! Verifies:
//! - Submitted jobs are visible as queued without a result
//! - Workers drive jobs to done, with spans covering the original text
//! - Analyzer failures surface as status=error and leave nothing pending
//! - Several consumers sharing a group process every job exactly once in effect

use std::sync::Arc;
use std::time::Duration;

use textq_analyzer::{Analyzer, AnalyzerError, RuleSegmenter};
use textq_core::{AnalysisResult, JobStatus};
use tokio_util::sync::CancellationToken;

use crate::context::PipelineContext;
use crate::job_store::{InMemoryJobStore, JobStore};
use crate::queue::{InMemoryQueue, Queue};
use crate::workers::WorkerConfig;

const STREAM: &str = "jobs";
const GROUP: &str = "segment_group";

fn worker_config(consumer: &str) -> WorkerConfig {
    WorkerConfig {
        consumer: consumer.to_string(),
        block_timeout: Duration::ZERO,
        idle_sleep: Duration::from_millis(1),
        ..WorkerConfig::default()
    }
}

fn setup() -> (PipelineContext, Arc<InMemoryJobStore>, Arc<InMemoryQueue>) {
    let store = Arc::new(InMemoryJobStore::new());
    let queue = Arc::new(InMemoryQueue::new());
    let ctx = PipelineContext::new(store.clone(), queue.clone(), STREAM);
    (ctx, store, queue)
}

struct FaultyAnalyzer;

impl Analyzer for FaultyAnalyzer {
    fn analyze(&self, _text: &str) -> Result<AnalysisResult, AnalyzerError> {
        Err(AnalyzerError::failed("injected fault"))
    }
}

#[tokio::test]
async fn hello_world_goes_from_queued_to_done() {
    let (ctx, store, queue) = setup();
    let worker = ctx.worker(Arc::new(RuleSegmenter::new()), worker_config("w1"));
    queue.ensure_group(STREAM, GROUP).await.unwrap();

    let text = "Hello. World!";
    let job_id = ctx.dispatcher().submit(text).await.unwrap().job_id;

    let view = store.query(job_id).await.unwrap().unwrap();
    assert_eq!(view.status, JobStatus::Queued);
    assert!(view.result.is_none());

    worker.run_once(&CancellationToken::new()).await.unwrap();

    let view = store.query(job_id).await.unwrap().unwrap();
    assert_eq!(view.status, JobStatus::Done);
    let result = view.result.unwrap();

    let chars: Vec<char> = text.chars().collect();
    let sentence_text: Vec<String> = result
        .sentences
        .iter()
        .map(|s| chars[s.start..s.end].iter().collect())
        .collect();
    assert_eq!(sentence_text, vec!["Hello.", "World!"]);
    for token in &result.tokens {
        let covered: String = chars[token.start..token.end].iter().collect();
        assert_eq!(covered, token.text);
    }
}

#[tokio::test]
async fn faulty_analyzer_ends_in_error_with_nothing_pending() {
    let (ctx, store, queue) = setup();
    let worker = ctx.worker(Arc::new(FaultyAnalyzer), worker_config("w1"));
    queue.ensure_group(STREAM, GROUP).await.unwrap();

    let job_id = ctx.dispatcher().submit("Hello. World!").await.unwrap().job_id;
    worker.run_once(&CancellationToken::new()).await.unwrap();

    let view = store.query(job_id).await.unwrap().unwrap();
    assert_eq!(view.status, JobStatus::Error);
    assert!(view.error.as_deref().unwrap_or_default().contains("injected fault"));
    assert!(view.result.is_none());
    assert_eq!(queue.pending_count(STREAM, GROUP), 0);
}

#[tokio::test]
async fn competing_consumers_drain_the_backlog() {
    let (ctx, store, queue) = setup();
    queue.ensure_group(STREAM, GROUP).await.unwrap();

    let dispatcher = ctx.dispatcher();
    let mut ids = Vec::new();
    for i in 0..20 {
        ids.push(dispatcher.submit(&format!("Job {i}. Done.")).await.unwrap().job_id);
    }

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();
    for name in ["w1", "w2", "w3"] {
        let worker = ctx.worker(Arc::new(RuleSegmenter::new()), worker_config(name));
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move { worker.run(cancel).await }));
    }

    for _ in 0..200 {
        let mut done = 0;
        for id in &ids {
            if store.query(*id).await.unwrap().unwrap().status == JobStatus::Done {
                done += 1;
            }
        }
        if done == ids.len() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cancel.cancel();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    for id in &ids {
        assert_eq!(store.query(*id).await.unwrap().unwrap().status, JobStatus::Done);
    }
    assert_eq!(store.result_count(), ids.len());
    assert_eq!(queue.pending_count(STREAM, GROUP), 0);
}

#[tokio::test]
async fn backlog_enqueued_before_group_exists_is_processed() {
    let (ctx, store, _queue) = setup();
    let job_id = ctx.dispatcher().submit("Early bird.").await.unwrap().job_id;

    let worker = ctx.worker(Arc::new(RuleSegmenter::new()), worker_config("late"));
    let cancel = CancellationToken::new();
    let run = {
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.run(cancel).await })
    };

    for _ in 0..100 {
        if store.query(job_id).await.unwrap().unwrap().status == JobStatus::Done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cancel.cancel();
    run.await.unwrap().unwrap();

    assert_eq!(store.query(job_id).await.unwrap().unwrap().status, JobStatus::Done);
}
