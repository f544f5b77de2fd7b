use std::sync::Arc;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tokio_util::sync::CancellationToken;

use textq_analyzer::{Analyzer, RuleSegmenter};
use textq_infra::PipelineContext;
use textq_infra::queue::Queue;
use textq_infra::workers::WorkerConfig;

fn sample_text(sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("Sentence number {i} has a few words, some punctuation and 3.14 in it."))
        .collect::<Vec<_>>()
        .join(" ")
}

fn bench_analyzer_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyzer_throughput");
    let analyzer = RuleSegmenter::new();

    for sentences in [10usize, 100, 1_000] {
        let text = sample_text(sentences);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(sentences), &text, |b, text| {
            b.iter(|| analyzer.analyze(black_box(text)).map(|r| r.tokens.len()))
        });
    }

    group.finish();
}

fn bench_submit_and_process(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("pipeline_latency");

    let ctx = PipelineContext::in_memory("jobs");
    let worker = ctx.worker(
        Arc::new(RuleSegmenter::new()),
        WorkerConfig {
            block_timeout: Duration::ZERO,
            ..WorkerConfig::default()
        },
    );
    let dispatcher = ctx.dispatcher();
    let cancel = CancellationToken::new();
    rt.block_on(ctx.queue.ensure_group("jobs", "segment_group"))
        .unwrap();

    let text = sample_text(20);
    group.bench_function("submit_then_run_once", |b| {
        b.to_async(&rt).iter(|| async {
            dispatcher.submit(black_box(&text)).await.unwrap();
            worker.run_once(&cancel).await.unwrap();
        })
    });

    group.finish();
}

criterion_group!(benches, bench_analyzer_throughput, bench_submit_and_process);
criterion_main!(benches);
