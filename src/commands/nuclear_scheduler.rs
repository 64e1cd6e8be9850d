use anyhow::Result;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

use crate::context::AppContext;

/// Single cooperative long-running loop: each pass processes every nuclear
/// failure record due for retry, then sleeps `interval_secs` before the
/// next pass. Checks the shutdown flag between passes, same as the search
/// fallback's background processor.
pub async fn run(ctx: &AppContext, interval_secs: u64) -> Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    loop {
        let stats = ctx.pipeline.nuclear.process_due().await;
        if stats.processed > 0 {
            info!(
                processed = stats.processed,
                successful = stats.successful,
                failed = stats.failed,
                human_required = stats.human_required,
                "nuclear retry pass complete"
            );
        }

        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(interval_secs)) => {}
            _ = interrupt.recv() => {
                info!("shutdown signal received, stopping nuclear scheduler");
                break;
            }
            _ = terminate.recv() => {
                info!("shutdown signal received, stopping nuclear scheduler");
                break;
            }
        }
    }

    Ok(())
}
