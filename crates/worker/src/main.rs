use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use textq_analyzer::RuleSegmenter;
use textq_infra::PipelineContext;
use textq_infra::config::{DatabaseArgs, QueueArgs, WorkerArgs};
use textq_worker::health::{self, HealthState};

/// Consumes job messages, runs the analyzer and records results.
#[derive(Debug, Parser)]
#[command(name = "textq-worker", version)]
struct Cli {
    #[command(flatten)]
    queue: QueueArgs,

    #[command(flatten)]
    database: DatabaseArgs,

    #[command(flatten)]
    worker: WorkerArgs,

    /// Address of the liveness endpoint.
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8000")]
    health_addr: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    textq_observability::init();

    let cli = Cli::parse();

    let ctx = PipelineContext::connect(&cli.queue, &cli.database)
        .await
        .context("failed to connect job store / queue")?;

    let worker = ctx.worker(
        Arc::new(RuleSegmenter::new()),
        cli.worker.to_config(&cli.queue.stream),
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
            cancel.cancel();
        });
    }

    let listener = tokio::net::TcpListener::bind(cli.health_addr)
        .await
        .with_context(|| format!("failed to bind {}", cli.health_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "health endpoint listening");

    let health_app = health::router(HealthState::for_worker(&worker));
    let health_cancel = cancel.clone();
    let health_server = tokio::spawn(async move {
        axum::serve(listener, health_app)
            .with_graceful_shutdown(async move { health_cancel.cancelled().await })
            .await
    });

    let result = worker.run(cancel.clone()).await;
    cancel.cancel();

    match health_server.await {
        Ok(Err(e)) => tracing::warn!(error = %e, "health server error"),
        Err(e) => tracing::warn!(error = %e, "health server task failed"),
        Ok(Ok(())) => {}
    }
    ctx.shutdown().await;

    result.context("worker stopped with an error")
}
