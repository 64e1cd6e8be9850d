use anyhow::Result;

use crate::context::AppContext;

pub async fn run(ctx: &AppContext) -> Result<()> {
    println!("== nuclear retry store ==");
    for (status, count) in ctx.storage.nuclear_failure_counts().await? {
        println!("  {status:<28} {count}");
    }
    Ok(())
}
