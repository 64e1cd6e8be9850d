use anyhow::Result;

use crate::context::AppContext;

pub async fn run(ctx: &AppContext) -> Result<()> {
    let today = ctx.storage.today_search_stats().await?;
    println!("== search quota (today, UTC) ==");
    println!("  performed  {}", today.searches_performed);
    println!("  successful {}", today.successful_searches);
    println!("  failed     {}", today.failed_searches);
    println!(
        "  quota_used {}/{}",
        today.quota_used, ctx.config.search.daily_quota
    );
    Ok(())
}
