use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use docket_api::app::{AppServices, build_app};
use docket_infra::AppConfig;
use docket_infra::external::openai::OpenAiTextGenerator;
use docket_infra::jobs::{WorkerConfig, WorkerPoolConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    docket_observability::init();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    info!(bind_addr = %config.bind_addr, openai = ?config.openai, "starting docket-api");

    let services = Arc::new(AppServices::from_config(&config).await?);

    let generator = OpenAiTextGenerator::new(config.openai.clone())?;
    let workers = services.spawn_workers(
        generator,
        WorkerConfig::default().with_retry_policy(config.retry_policy.clone()),
        WorkerPoolConfig::default().with_concurrency(config.worker_concurrency),
    );

    let app = build_app(services);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(stats = ?workers.stats(), "http server stopped; draining workers");
    workers.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
