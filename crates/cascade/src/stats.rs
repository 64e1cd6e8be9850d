use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use ingest_resilience::persist;

/// Per-strategy counters. `attempts = successes + failures + truncated`,
/// enforced by only ever incrementing through [`StrategyStatsTable::record`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub truncated: u64,
    pub avg_time_secs: f64,
}

impl StrategyStats {
    /// Observed success rate, falling back to the strategy's declared base
    /// rate when it has never been attempted.
    pub fn observed_rate(&self, base_rate: f64) -> f64 {
        if self.attempts == 0 {
            base_rate
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure,
    Truncated,
}

/// Shape persisted to the strategy-statistics JSON file: global counters plus
/// per-strategy breakdown and a bounded processing-time history.
#[derive(Debug, Serialize, Deserialize, Default)]
struct StatsDocument {
    total_attempts: u64,
    total_successes: u64,
    total_failures: u64,
    strategy_stats: HashMap<String, StrategyStats>,
    processing_times: Vec<f64>,
    last_updated: Option<DateTime<Utc>>,
}

const MAX_PROCESSING_TIMES: usize = 1000;

/// Shared, persisted table of per-strategy statistics. Every record is
/// atomic with the attempt it describes — a crash may lose the most recent
/// update but never leaves `attempts` out of sync with its three summands.
pub struct StrategyStatsTable {
    table: DashMap<String, StrategyStats>,
    processing_times: Mutex<Vec<f64>>,
    path: PathBuf,
}

impl StrategyStatsTable {
    pub fn new(stats_file: impl AsRef<Path>) -> Self {
        Self {
            table: DashMap::new(),
            processing_times: Mutex::new(Vec::new()),
            path: stats_file.as_ref().to_path_buf(),
        }
    }

    pub async fn load(stats_file: impl AsRef<Path>) -> Arc<Self> {
        let path = stats_file.as_ref().to_path_buf();
        let doc = persist::load_json::<StatsDocument>(&path).await.unwrap_or_default();
        let table = DashMap::new();
        for (name, stats) in doc.strategy_stats {
            table.insert(name, stats);
        }
        Arc::new(Self {
            table,
            processing_times: Mutex::new(doc.processing_times),
            path,
        })
    }

    pub fn stats_for(&self, strategy: &str) -> StrategyStats {
        self.table.get(strategy).map(|s| s.clone()).unwrap_or_default()
    }

    /// Records one attempt's outcome, updating the rolling average
    /// processing time as `avg' = ((avg*(n-1)) + t) / n`, then persists the
    /// whole table.
    pub async fn record(&self, strategy: &str, outcome: AttemptOutcome, elapsed_secs: Option<f64>) {
        {
            let mut entry = self.table.entry(strategy.to_string()).or_default();
            entry.attempts += 1;
            match outcome {
                AttemptOutcome::Success => entry.successes += 1,
                AttemptOutcome::Failure => entry.failures += 1,
                AttemptOutcome::Truncated => entry.truncated += 1,
            }
            if let Some(t) = elapsed_secs {
                let n = entry.attempts as f64;
                entry.avg_time_secs = ((entry.avg_time_secs * (n - 1.0)) + t) / n;
            }
        }

        if let Some(t) = elapsed_secs {
            let mut times = self.processing_times.lock().await;
            times.push(t);
            if times.len() > MAX_PROCESSING_TIMES {
                let excess = times.len() - MAX_PROCESSING_TIMES;
                times.drain(0..excess);
            }
        }

        self.persist().await;
    }

    async fn persist(&self) {
        let strategy_stats: HashMap<String, StrategyStats> = self
            .table
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let processing_times = self.processing_times.lock().await.clone();

        let total_attempts = strategy_stats.values().map(|s| s.attempts).sum();
        let total_successes = strategy_stats.values().map(|s| s.successes).sum();
        let total_failures = strategy_stats.values().map(|s| s.failures).sum();

        let doc = StatsDocument {
            total_attempts,
            total_successes,
            total_failures,
            strategy_stats,
            processing_times,
            last_updated: Some(Utc::now()),
        };

        if let Err(err) = persist::save_json(&self.path, &doc).await {
            tracing::warn!(error = %err, "failed to persist strategy statistics");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observed_rate_falls_back_to_base() {
        let stats = StrategyStats::default();
        assert_eq!(stats.observed_rate(0.5), 0.5);
    }

    #[test]
    fn observed_rate_uses_history_once_attempted() {
        let stats = StrategyStats {
            attempts: 4,
            successes: 3,
            failures: 1,
            truncated: 0,
            avg_time_secs: 1.0,
        };
        assert_eq!(stats.observed_rate(0.5), 0.75);
    }

    #[tokio::test]
    async fn attempts_equal_sum_of_outcomes() {
        let dir = tempfile_dir();
        let table = StrategyStatsTable::new(dir.join("stats.json"));
        table.record("direct", AttemptOutcome::Success, Some(1.0)).await;
        table.record("direct", AttemptOutcome::Failure, Some(2.0)).await;
        table.record("direct", AttemptOutcome::Truncated, Some(0.5)).await;

        let stats = table.stats_for("direct");
        assert_eq!(stats.attempts, stats.successes + stats.failures + stats.truncated);
        assert_eq!(stats.attempts, 3);
    }

    fn tempfile_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cascade-stats-test-{}", uuid_like()));
        dir
    }

    fn uuid_like() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos() as u64
    }
}
