use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ingestd", about = "Resilient content ingestion engine")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a single URL for ingestion
    Submit {
        /// URL to fetch and extract
        url: String,

        /// Job priority, higher runs first
        #[arg(short, long, default_value = "50")]
        priority: i32,

        /// Free-form source tag stored alongside the job
        #[arg(short, long, default_value = "cli")]
        source: String,
    },
    /// Submit many URLs (newline-delimited file or comma-separated list) in one transaction
    BulkSubmit {
        /// Path to a file with one URL per line, or a comma-separated list
        #[arg(short, long)]
        urls: String,

        #[arg(short, long, default_value = "50")]
        priority: i32,

        #[arg(short, long, default_value = "cli-bulk")]
        source: String,
    },
    /// Run the persisted worker pool (dequeues jobs until shutdown signal)
    Worker {
        /// Number of concurrent worker tasks
        #[arg(short = 'n', long)]
        workers: Option<usize>,
    },
    /// Run the nuclear-retry scheduler loop (long-horizon reprocessing)
    NuclearScheduler {
        /// Seconds between scheduler passes
        #[arg(short, long, default_value = "60")]
        interval_secs: u64,
    },
    /// Print job queue, content, and resilience health counts
    Status,
    /// Print search-fallback queue and daily quota counters
    SearchStatus,
    /// Print nuclear-retry store counts by status
    NuclearStatus,
}
