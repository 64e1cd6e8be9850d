use anyhow::Result;
use ingest_resilience::SERVICE_NAMES;

use crate::context::AppContext;

pub async fn run(ctx: &AppContext) -> Result<()> {
    println!("== job queue ==");
    for (status, count) in ctx.storage.job_counts_by_status().await? {
        println!("  {status:<10} {count}");
    }

    let content_count = ctx.storage.content_count().await?;
    println!("== content store ==");
    println!("  rows {content_count}");

    println!("== resilience ==");
    for name in SERVICE_NAMES {
        if let Some(view) = ctx.registry.health_view(name) {
            println!(
                "  {:<22} health={:<9} breaker={:<10} success_rate={:.2} requests={}",
                view.name,
                format!("{:?}", view.health).to_lowercase(),
                format!("{:?}", view.breaker_state).to_lowercase(),
                view.success_rate,
                view.total_requests,
            );
        }
    }

    Ok(())
}
