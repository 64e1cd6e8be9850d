use anyhow::Result;
use ingest_worker::WorkerPool;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

use crate::context::AppContext;

/// Runs the worker pool until SIGINT or SIGTERM, then drains in-flight jobs
/// before returning.
pub async fn run(ctx: &AppContext, workers: Option<usize>) -> Result<()> {
    let worker_count = workers.unwrap_or(ctx.config.general.max_concurrent);
    info!(worker_count, "starting worker pool");

    let pool = WorkerPool::new(ctx.pipeline.clone(), worker_count.max(1));

    pool.run(async {
        let mut interrupt = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
        let mut terminate = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
    })
    .await;

    info!("worker pool drained, exiting");
    Ok(())
}
