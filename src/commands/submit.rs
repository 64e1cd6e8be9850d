use anyhow::Result;

use crate::context::AppContext;

pub async fn submit(ctx: &AppContext, url: &str, priority: i32, source: &str) -> Result<()> {
    let job_id = ctx.storage.submit_job(url, priority, source).await?;
    println!("submitted job {job_id} for {url}");
    Ok(())
}

/// `urls` is either a path to a newline-delimited file or a comma-separated
/// list, matching the two shapes callers of the bulk submission API use.
pub async fn bulk_submit(ctx: &AppContext, urls: &str, priority: i32, source: &str) -> Result<()> {
    let list = load_urls(urls)?;
    if list.is_empty() {
        println!("no URLs found in {urls}");
        return Ok(());
    }

    let ids = ctx.storage.submit_jobs_bulk(&list, priority, source).await?;
    println!("submitted {} jobs", ids.len());
    Ok(())
}

fn load_urls(arg: &str) -> Result<Vec<String>> {
    let raw = if std::path::Path::new(arg).is_file() {
        std::fs::read_to_string(arg)?
    } else {
        arg.to_string()
    };

    Ok(raw
        .split(|c| c == '\n' || c == ',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}
