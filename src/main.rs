mod cli;
mod commands;
mod context;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

// mimalloc avoids glibc malloc's reluctance to release memory back to the OS
// under the worker pool's sustained concurrent-fetch allocation churn.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use ingest_core::config::AppConfig;

use crate::cli::{Cli, Commands};
use crate::context::AppContext;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using built-in defaults");
        include_str!("../config/default.toml").to_string()
    });
    let config: AppConfig = toml::from_str(&config_str)?;

    let ctx = AppContext::build(config).await?;

    match cli.command {
        Commands::Submit { url, priority, source } => {
            commands::submit::submit(&ctx, &url, priority, &source).await?;
        }
        Commands::BulkSubmit { urls, priority, source } => {
            commands::submit::bulk_submit(&ctx, &urls, priority, &source).await?;
        }
        Commands::Worker { workers } => {
            commands::worker::run(&ctx, workers).await?;
        }
        Commands::NuclearScheduler { interval_secs } => {
            commands::nuclear_scheduler::run(&ctx, interval_secs).await?;
        }
        Commands::Status => {
            commands::status::run(&ctx).await?;
        }
        Commands::SearchStatus => {
            commands::search_status::run(&ctx).await?;
        }
        Commands::NuclearStatus => {
            commands::nuclear_status::run(&ctx).await?;
        }
    }

    Ok(())
}
