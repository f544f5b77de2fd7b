use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use textq_analyzer::{Analyzer, AnalyzerError, RuleSegmenter};
use textq_core::AnalysisResult;
use textq_infra::PipelineContext;
use textq_infra::job_store::InMemoryJobStore;
use textq_infra::queue::InMemoryQueue;
use textq_infra::workers::WorkerConfig;

const STREAM: &str = "jobs";
const GROUP: &str = "segment_group";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
    worker: Option<(CancellationToken, tokio::task::JoinHandle<()>)>,
    queue: Arc<InMemoryQueue>,
}

impl TestServer {
    async fn spawn(max_text_bytes: usize, analyzer: Option<Arc<dyn Analyzer>>) -> Self {
        let queue = Arc::new(InMemoryQueue::new());
        let ctx = PipelineContext::new(Arc::new(InMemoryJobStore::new()), queue.clone(), STREAM);

        // Same router as prod, bound to an ephemeral port.
        let app = textq_api::app::build_app(&ctx, max_text_bytes);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let worker = analyzer.map(|analyzer| {
            let worker = ctx.worker(
                analyzer,
                WorkerConfig {
                    block_timeout: Duration::from_millis(20),
                    idle_sleep: Duration::from_millis(5),
                    ..WorkerConfig::default()
                },
            );
            let cancel = CancellationToken::new();
            let token = cancel.clone();
            let join = tokio::spawn(async move {
                worker.run(token).await.unwrap();
            });
            (cancel, join)
        });

        Self { base_url, handle, worker, queue }
    }

    async fn without_worker() -> Self {
        Self::spawn(1024, None).await
    }

    async fn with_worker(analyzer: Arc<dyn Analyzer>) -> Self {
        Self::spawn(1024, Some(analyzer)).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
        if let Some((cancel, join)) = self.worker.take() {
            cancel.cancel();
            join.abort();
        }
    }
}

struct FaultyAnalyzer;

impl Analyzer for FaultyAnalyzer {
    fn analyze(&self, _text: &str) -> Result<AnalysisResult, AnalyzerError> {
        Err(AnalyzerError::failed("injected analyzer fault"))
    }
}

async fn submit(client: &reqwest::Client, srv: &TestServer, text: &str) -> String {
    let res = client
        .post(srv.url("/v1/analyze"))
        .json(&json!({ "text": text }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: Value = res.json().await.unwrap();
    body["job_id"].as_str().unwrap().to_string()
}

async fn get_job(client: &reqwest::Client, srv: &TestServer, id: &str) -> (StatusCode, Value) {
    let res = client
        .get(srv.url(&format!("/v1/jobs/{id}")))
        .send()
        .await
        .unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

async fn poll_until_terminal(client: &reqwest::Client, srv: &TestServer, id: &str) -> Value {
    // Processing is asynchronous; poll briefly until the worker finishes.
    for _ in 0..200 {
        let (status, body) = get_job(client, srv, id).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "done" || body["status"] == "error" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not reach a terminal state in time");
}

/// The ack follows the store update, so it can trail the status by a moment.
async fn wait_for_no_pending(srv: &TestServer) {
    for _ in 0..50 {
        if srv.queue.pending_count(STREAM, GROUP) == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("delivery still pending after processing");
}

#[tokio::test]
async fn healthz_reports_ok() {
    let srv = TestServer::without_worker().await;
    let res = reqwest::get(srv.url("/healthz")).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn submitted_job_is_queued_without_result() {
    let srv = TestServer::without_worker().await;
    let client = reqwest::Client::new();

    let id = submit(&client, &srv, "Hello. World!").await;
    assert!(uuid_like(&id));

    let (status, body) = get_job(&client, &srv, &id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "job_id": id, "status": "queued" }));
    assert_eq!(srv.queue.len(STREAM), 1);
}

#[tokio::test]
async fn job_ids_are_unique() {
    let srv = TestServer::without_worker().await;
    let client = reqwest::Client::new();

    let mut seen = std::collections::HashSet::new();
    for i in 0..20 {
        assert!(seen.insert(submit(&client, &srv, &format!("Text {i}.")).await));
    }
}

#[tokio::test]
async fn invalid_analyze_bodies_are_rejected() {
    let srv = TestServer::without_worker().await;
    let client = reqwest::Client::new();

    for body in [json!({ "text": "" }), json!({ "text": "   \n" }), json!({ "text": 42 }), json!({})] {
        let res = client
            .post(srv.url("/v1/analyze"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "body: {body}");
        let err: Value = res.json().await.unwrap();
        assert_eq!(err["error"], "validation_error");
    }

    let res = client
        .post(srv.url("/v1/analyze"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "invalid_json");

    assert!(srv.queue.is_empty(STREAM));
}

#[tokio::test]
async fn oversized_text_is_rejected_with_413() {
    let srv = TestServer::spawn(16, None).await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/v1/analyze"))
        .json(&json!({ "text": "this text is longer than sixteen bytes" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "payload_too_large");

    // Exactly at the limit is fine.
    let res = client
        .post(srv.url("/v1/analyze"))
        .json(&json!({ "text": "sixteen bytes ok" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn job_lookup_validates_and_reports_missing() {
    let srv = TestServer::without_worker().await;
    let client = reqwest::Client::new();

    let (status, body) = get_job(&client, &srv, "not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");

    let (status, body) = get_job(&client, &srv, "6f1c1f43-4a43-4c55-9a8b-0d8d7c6a4e11").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn hello_world_completes_with_spans() {
    let srv = TestServer::with_worker(Arc::new(RuleSegmenter::new())).await;
    let client = reqwest::Client::new();

    let id = submit(&client, &srv, "Hello. World!").await;
    let body = poll_until_terminal(&client, &srv, &id).await;

    assert_eq!(body["status"], "done");
    assert!(body.get("error").is_none());
    assert_eq!(
        body["result"]["sentences"],
        json!([{ "start": 0, "end": 6 }, { "start": 7, "end": 13 }])
    );
    let tokens: Vec<&str> = body["result"]["tokens"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["text"].as_str().unwrap())
        .collect();
    assert_eq!(tokens, vec!["Hello", ".", "World", "!"]);
    wait_for_no_pending(&srv).await;
}

#[tokio::test]
async fn analyzer_fault_surfaces_as_job_error() {
    let srv = TestServer::with_worker(Arc::new(FaultyAnalyzer)).await;
    let client = reqwest::Client::new();

    let id = submit(&client, &srv, "Hello. World!").await;
    let body = poll_until_terminal(&client, &srv, &id).await;

    assert_eq!(body["status"], "error");
    assert!(body["error"].as_str().unwrap().contains("injected analyzer fault"));
    assert!(body.get("result").is_none());

    wait_for_no_pending(&srv).await;
}

fn uuid_like(s: &str) -> bool {
    s.len() == 36 && s.chars().filter(|c| *c == '-').count() == 4
}
