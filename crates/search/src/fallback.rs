use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ingest_core::IngestError;
use ingest_resilience::{CircuitBreaker, RetryManager, RetryPolicy};
use tracing::{info, warn};

use crate::google;
use crate::queue::{SearchQueue, PRIORITY_BACKGROUND, PRIORITY_NORMAL, PRIORITY_URGENT};
use crate::rate_limiter::RateLimiter;

/// The three priority classes the Search Request data model names. Only
/// `Urgent` gets an inline attempt before falling back to the queue;
/// `Normal` and `Background` both queue immediately and differ only in
/// dequeue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPriority {
    Urgent,
    Normal,
    Background,
}

impl SearchPriority {
    fn as_queue_priority(self) -> i32 {
        match self {
            SearchPriority::Urgent => PRIORITY_URGENT,
            SearchPriority::Normal => PRIORITY_NORMAL,
            SearchPriority::Background => PRIORITY_BACKGROUND,
        }
    }
}

/// Priority a job re-submitted for a search-discovered alternative URL is
/// enqueued at — higher than ordinary submissions so the cascade revisits
/// it promptly, matching the synchronous fallback path in `ingest-worker`.
const FALLBACK_JOB_PRIORITY: i32 = 80;

/// Finds an alternative URL for a piece of content via Google Custom
/// Search, used when every fetch strategy has failed. Caches completed
/// lookups, serves urgent requests inline, and drains everything else
/// through a single background processor task.
///
/// Grounded on the cache-then-inline-or-queue dispatch and the
/// priority-then-FIFO background drain loop with capped exponential
/// inter-attempt backoff.
pub struct SearchFallbackService {
    client: reqwest::Client,
    api_key: Option<String>,
    search_engine_id: Option<String>,
    queue: Arc<SearchQueue>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    retry_manager: RetryManager,
    retry_policy: RetryPolicy,
    processor_running: Arc<AtomicBool>,
}

impl SearchFallbackService {
    pub fn new(
        client: reqwest::Client,
        api_key: Option<String>,
        search_engine_id: Option<String>,
        queue: Arc<SearchQueue>,
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
        retry_policy: RetryPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            api_key,
            search_engine_id,
            queue,
            limiter,
            breaker,
            retry_manager: RetryManager::new("search-fallback"),
            retry_policy,
            processor_running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Resolves `query` to an alternative URL, or `None` if search is
    /// unconfigured, exhausted, or simply comes up empty.
    pub async fn search(self: &Arc<Self>, query: &str, priority: SearchPriority) -> Result<Option<String>, IngestError> {
        if let Some(cached) = self.queue.cached_result(query).await? {
            return Ok(Some(cached));
        }

        if priority == SearchPriority::Urgent {
            match self.attempt_once(query).await {
                Ok(result) => {
                    self.queue.record_outcome(result.is_some()).await?;
                    if let Some(url) = result {
                        return Ok(Some(url));
                    }
                }
                Err(err) => {
                    warn!(query, error = %err, "urgent inline search failed, falling back to queue");
                }
            }
        }

        let id = self.queue.enqueue(query, priority.as_queue_priority()).await?;
        info!(query, id, "search queued for background processing");
        self.ensure_processor_running();
        Ok(None)
    }

    /// Resets every failed search request to pending and kicks the
    /// background processor, per the "try everything again" nuclear path.
    pub async fn nuclear_retry_all(self: &Arc<Self>) -> Result<u64, IngestError> {
        let reset = self.queue.reset_all_failed().await?;
        self.ensure_processor_running();
        Ok(reset)
    }

    fn ensure_processor_running(self: &Arc<Self>) {
        if self.processor_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.run_processor().await;
            service.processor_running.store(false, Ordering::SeqCst);
        });
    }

    async fn run_processor(self: &Arc<Self>) {
        loop {
            let request = match self.queue.dequeue().await {
                Ok(Some(r)) => r,
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "failed to dequeue search request");
                    break;
                }
            };

            match self.attempt_once(&request.query).await {
                Ok(Some(url)) => {
                    let _ = self.queue.mark_completed(request.id, &url).await;
                    let _ = self.queue.record_outcome(true).await;
                    // The request was dispatched into the background precisely
                    // because no caller is waiting on this result synchronously
                    // (see `search()` below) — without re-submitting a job here,
                    // a URL discovered this way would never reach the cascade.
                    match self.queue.storage().submit_job(&url, FALLBACK_JOB_PRIORITY, "search-fallback").await {
                        Ok(job_id) => info!(url, job_id, "queued follow-up job for background search result"),
                        Err(err) => warn!(url, error = %err, "failed to queue follow-up job for background search result"),
                    }
                }
                Ok(None) => {
                    let _ = self.queue.mark_failed(request.id, "no results", true).await;
                    let _ = self.queue.record_outcome(false).await;
                }
                Err(IngestError::RateLimited(_)) => {
                    let _ = self.queue.mark_rate_limited(request.id).await;
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    continue;
                }
                Err(err) => {
                    let _ = self.queue.mark_failed(request.id, &err.to_string(), true).await;
                    let _ = self.queue.record_outcome(false).await;
                    let backoff = Duration::from_secs(300.min(2u64.saturating_pow(request.attempts.max(0) as u32)));
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn attempt_once(&self, query: &str) -> Result<Option<String>, IngestError> {
        let (Some(api_key), Some(search_engine_id)) = (self.api_key.as_deref(), self.search_engine_id.as_deref()) else {
            return Err(IngestError::Config("search api credentials not configured".into()));
        };

        self.limiter.wait_if_needed().await;

        let client = self.client.clone();
        let api_key = api_key.to_string();
        let search_engine_id = search_engine_id.to_string();
        let query = query.to_string();

        let breaker = Arc::clone(&self.breaker);
        self.retry_manager
            .execute(&self.retry_policy, move || {
                let client = client.clone();
                let api_key = api_key.clone();
                let search_engine_id = search_engine_id.clone();
                let query = query.clone();
                let breaker = Arc::clone(&breaker);
                async move {
                    breaker
                        .call(move || async move { google::search_once(&client, &api_key, &search_engine_id, &query).await })
                        .await
                }
            })
            .await
    }
}
