pub mod variations;

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use ingest_analyzer::AnalyzerPolicy;
use ingest_cascade::Cascade;
use ingest_core::IngestError;
use ingest_search::{SearchFallbackService, SearchPriority};
use ingest_storage::Storage;
use ingest_strategies::FetchContext;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

/// Taxonomy of what stage of the pipeline originally failed, persisted as
/// the `failure_type` column. Dispatch never inspects this beyond logging —
/// every kind is retried the same "try everything" way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    UrlProcessing,
    Search,
    Extraction,
    Api,
    Network,
    Unknown,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::UrlProcessing => "url-processing",
            FailureKind::Search => "search",
            FailureKind::Extraction => "extraction",
            FailureKind::Api => "api",
            FailureKind::Network => "network",
            FailureKind::Unknown => "unknown",
        }
    }
}

const BASE_BACKOFF_SECS: i64 = 60;
const MAX_BACKOFF_SECS: i64 = 86_400;
const BATCH_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Default, Clone, Copy)]
pub struct NuclearRunStats {
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub human_required: u64,
}

/// Last-resort recovery for content every ordinary attempt has given up on.
/// Records due for retry are processed with an escalating "try everything"
/// strategy — reprocess the original URL directly, fall back to search for
/// an alternative, then try a handful of generated search-query variants —
/// before rescheduling with exponential backoff or escalating to a human.
pub struct NuclearRetryStore {
    storage: Storage,
    cascade: Arc<Cascade>,
    ctx: FetchContext,
    search: Arc<SearchFallbackService>,
    paywall_phrases: Vec<String>,
    paywall_selectors: Vec<String>,
    min_word_count: usize,
    title_ratio_threshold: f64,
    max_retry_attempts: u32,
    human_intervention_threshold: u32,
}

impl NuclearRetryStore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Storage,
        cascade: Arc<Cascade>,
        ctx: FetchContext,
        search: Arc<SearchFallbackService>,
        paywall_phrases: Vec<String>,
        paywall_selectors: Vec<String>,
        min_word_count: usize,
        title_ratio_threshold: f64,
        max_retry_attempts: u32,
        human_intervention_threshold: u32,
    ) -> Self {
        Self {
            storage,
            cascade,
            ctx,
            search,
            paywall_phrases,
            paywall_selectors,
            min_word_count,
            title_ratio_threshold,
            max_retry_attempts,
            human_intervention_threshold,
        }
    }

    pub async fn record_failure(&self, kind: FailureKind, url: &str, title: Option<&str>, error: &str) -> Result<i64, IngestError> {
        self.storage
            .insert_nuclear_failure(kind.as_str(), url, title, error)
            .await
            .map_err(IngestError::Other)
    }

    fn policy(&self) -> AnalyzerPolicy<'_> {
        AnalyzerPolicy {
            paywall_phrases: &self.paywall_phrases,
            paywall_selectors: &self.paywall_selectors,
            min_word_count: self.min_word_count,
            title_ratio_threshold: self.title_ratio_threshold,
        }
    }

    /// Processes every record currently due, pacing each attempt by a short
    /// fixed delay so a burst of failures doesn't hammer downstream services.
    pub async fn process_due(&self) -> NuclearRunStats {
        let due = match self.storage.due_nuclear_failures(self.max_retry_attempts).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = %err, "failed to load due nuclear failures");
                return NuclearRunStats::default();
            }
        };

        let mut stats = NuclearRunStats::default();
        for row in due {
            stats.processed += 1;
            match self.try_everything(&row.original_url, row.content_title.as_deref()).await {
                Some(success_url) => {
                    stats.successful += 1;
                    if let Err(err) = self.storage.mark_nuclear_success(row.id, success_url.as_deref()).await {
                        warn!(error = %err, id = row.id, "failed to record nuclear success");
                    }
                }
                None => {
                    let next_count = row.retry_count + 1;
                    if (next_count as u32) >= self.human_intervention_threshold {
                        stats.human_required += 1;
                    } else {
                        stats.failed += 1;
                    }
                    let outcome = self
                        .storage
                        .reschedule_nuclear_failure(
                            row.id,
                            row.retry_count,
                            "all recovery strategies failed this pass",
                            ChronoDuration::seconds(BASE_BACKOFF_SECS),
                            ChronoDuration::seconds(MAX_BACKOFF_SECS),
                            self.human_intervention_threshold,
                        )
                        .await;
                    if let Err(err) = outcome {
                        warn!(error = %err, id = row.id, "failed to reschedule nuclear failure");
                    }
                }
            }
            tokio::time::sleep(BATCH_DELAY).await;
        }

        stats
    }

    /// The "try everything" cascade: reprocess the original URL directly,
    /// then ask the search fallback for an alternative, then try each
    /// generated query variation in turn. Returns the URL that finally
    /// produced acceptable content, or `None` if the whole pass came up dry.
    async fn try_everything(&self, original_url: &str, title: Option<&str>) -> Option<String> {
        if let Ok(url) = Url::parse(original_url) {
            let result = self.cascade.fetch(&url, &self.ctx, &self.policy(), &[]).await;
            if result.success {
                info!(url = original_url, "nuclear retry recovered via direct reprocess");
                return Some(original_url.to_string());
            }
        }

        let search_query = title.unwrap_or(original_url);
        if let Ok(Some(found)) = self.search.search(search_query, SearchPriority::Urgent).await {
            if let Ok(url) = Url::parse(&found) {
                let result = self.cascade.fetch(&url, &self.ctx, &self.policy(), &[]).await;
                if result.success {
                    info!(url = %found, "nuclear retry recovered via search fallback");
                    return Some(found);
                }
            }
        }

        for query in variations::generate(original_url, title) {
            if let Ok(Some(found)) = self.search.search(&query, SearchPriority::Urgent).await {
                if let Ok(url) = Url::parse(&found) {
                    let result = self.cascade.fetch(&url, &self.ctx, &self.policy(), &[]).await;
                    if result.success {
                        info!(url = %found, query, "nuclear retry recovered via query variation");
                        return Some(found);
                    }
                }
            }
        }

        None
    }

    pub async fn failure_counts(&self) -> Result<Vec<(String, i64)>, IngestError> {
        self.storage.nuclear_failure_counts().await.map_err(IngestError::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_round_trips_through_known_strings() {
        for kind in [
            FailureKind::UrlProcessing,
            FailureKind::Search,
            FailureKind::Extraction,
            FailureKind::Api,
            FailureKind::Network,
            FailureKind::Unknown,
        ] {
            assert!(!kind.as_str().is_empty());
        }
    }
}
