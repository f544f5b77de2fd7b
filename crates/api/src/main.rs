use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;

use textq_api::app::{DEFAULT_MAX_TEXT_BYTES, build_app};
use textq_infra::PipelineContext;
use textq_infra::config::{DatabaseArgs, QueueArgs};

/// Accepts text for analysis and serves job status.
#[derive(Debug, Parser)]
#[command(name = "textq-gateway", version)]
struct Cli {
    #[command(flatten)]
    queue: QueueArgs,

    #[command(flatten)]
    database: DatabaseArgs,

    /// Largest accepted `text`, in UTF-8 bytes.
    #[arg(long, env = "MAX_TEXT_BYTES", default_value_t = DEFAULT_MAX_TEXT_BYTES)]
    max_text_bytes: usize,

    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:5000")]
    bind_addr: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    textq_observability::init();

    let cli = Cli::parse();

    let ctx = PipelineContext::connect(&cli.queue, &cli.database)
        .await
        .context("failed to connect job store / queue")?;

    let app = build_app(&ctx, cli.max_text_bytes);

    let listener = tokio::net::TcpListener::bind(cli.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        stream = %ctx.stream,
        max_text_bytes = cli.max_text_bytes,
        "gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .context("server error")?;

    ctx.shutdown().await;
    Ok(())
}
