use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use ingest_analyzer::AnalyzerPolicy;
use ingest_cascade::Cascade;
use ingest_core::{FetchResult, IngestError, UrlFingerprint};
use ingest_nuclear::{FailureKind, NuclearRetryStore};
use ingest_resilience::ResilienceRegistry;
use ingest_search::{SearchFallbackService, SearchPriority};
use ingest_storage::Storage;
use ingest_strategies::FetchContext;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use url::Url;

const ARTICLE_PROCESSING_SERVICE: &str = "article-processing";

const FALLBACK_URL_PRIORITY: i32 = 80;
const MAX_JOB_RETRIES: u32 = 3;
const IDLE_SLEEP: Duration = Duration::from_secs(2);
const IDLE_BACKOFF_SLEEP: Duration = Duration::from_secs(10);
const IDLE_BACKOFF_THRESHOLD: u32 = 3;

/// Everything one worker (or one bulk-processing task) needs to carry a URL
/// through the full pipeline: dedup check, strategy cascade, search fallback
/// on failure, nuclear escalation if even that comes up empty.
pub struct Pipeline {
    pub storage: Storage,
    pub cascade: Arc<Cascade>,
    pub ctx: FetchContext,
    pub search: Arc<SearchFallbackService>,
    pub nuclear: Arc<NuclearRetryStore>,
    pub registry: Arc<ResilienceRegistry>,
    pub paywall_phrases: Vec<String>,
    pub paywall_selectors: Vec<String>,
    pub min_word_count: usize,
    pub title_ratio_threshold: f64,
    pub content_max_chars: usize,
}

pub enum JobOutcome {
    Duplicate,
    Stored {
        title: Option<String>,
        content_pointer: String,
        length: usize,
        word_count: usize,
    },
    FallbackQueued { alternative_job_id: String },
    Escalated,
}

impl Pipeline {
    fn policy(&self) -> AnalyzerPolicy<'_> {
        AnalyzerPolicy {
            paywall_phrases: &self.paywall_phrases,
            paywall_selectors: &self.paywall_selectors,
            min_word_count: self.min_word_count,
            title_ratio_threshold: self.title_ratio_threshold,
        }
    }

    /// Runs one URL through: dedup → cascade fetch → on success, store and
    /// return; on failure, ask the search fallback for an alternative and
    /// requeue it with a priority boost; if that also comes up empty, file
    /// a nuclear retry record so the long-horizon scheduler keeps trying.
    pub async fn process_url(&self, url_str: &str, source: &str) -> JobOutcome {
        let fingerprint = UrlFingerprint::new(url_str);

        match self.storage.content_by_fingerprint(&fingerprint).await {
            Ok(Some(_)) => return JobOutcome::Duplicate,
            Ok(None) => {}
            Err(err) => warn!(url = url_str, error = %err, "dedup check failed, proceeding anyway"),
        }

        let Ok(url) = Url::parse(url_str) else {
            self.escalate(FailureKind::UrlProcessing, url_str, None, "could not parse url").await;
            return JobOutcome::Escalated;
        };

        let result = self.fetch_under_breaker(&url).await;

        if result.success {
            let word_count = result.content.split_whitespace().count();
            let clipped_content = clip_to_chars(&result.content, self.content_max_chars);
            let content_pointer = fingerprint.to_string();
            let record = ingest_core::ContentRecord {
                url: content_pointer.clone(),
                title: result.title.clone(),
                content: clipped_content,
                content_type: "article".to_string(),
                metadata: serde_json::json!({ "strategy": result.strategy, "source": source }),
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            };
            let length = record.content.len();
            if let Err(err) = self.storage.upsert_content(&record).await {
                error!(url = url_str, error = %err, "failed to persist fetched content");
            }
            return JobOutcome::Stored {
                title: result.title,
                content_pointer,
                length,
                word_count,
            };
        }

        warn!(url = url_str, error = ?result.error, "all strategies failed, trying search fallback");
        let query = format!("{} {}", url.host_str().unwrap_or(""), url.path());
        match self.search.search(query.trim(), SearchPriority::Urgent).await {
            Ok(Some(alternative)) => match self.storage.submit_job(&alternative, FALLBACK_URL_PRIORITY, "search-fallback").await {
                Ok(job_id) => JobOutcome::FallbackQueued { alternative_job_id: job_id },
                Err(err) => {
                    error!(url = url_str, error = %err, "failed to queue fallback url");
                    self.escalate(FailureKind::Search, url_str, result.title.as_deref(), "failed to queue fallback url").await;
                    JobOutcome::Escalated
                }
            },
            Ok(None) => {
                self.escalate(
                    FailureKind::UrlProcessing,
                    url_str,
                    result.title.as_deref(),
                    result.error.as_deref().unwrap_or("all strategies and search fallback failed"),
                )
                .await;
                JobOutcome::Escalated
            }
            Err(err) => {
                self.escalate(FailureKind::Search, url_str, result.title.as_deref(), &err.to_string()).await;
                JobOutcome::Escalated
            }
        }
    }

    async fn escalate(&self, kind: FailureKind, url: &str, title: Option<&str>, error: &str) {
        if let Err(err) = self.nuclear.record_failure(kind, url, title, error).await {
            error!(url, error = %err, "failed to record nuclear failure");
        }
    }

    /// Runs the strategy cascade behind the `article-processing` circuit
    /// breaker. A cascade that exhausts every strategy counts as a breaker
    /// failure, same as one that never got to try because the breaker was
    /// already open — both surface here as a synthetic failed [`FetchResult`]
    /// so the rest of the pipeline doesn't need to special-case circuit-open.
    async fn fetch_under_breaker(&self, url: &Url) -> FetchResult {
        let cascade = &self.cascade;
        let ctx = &self.ctx;
        let policy = self.policy();
        let url_str = url.as_str();

        let breaker = self
            .registry
            .breaker(ARTICLE_PROCESSING_SERVICE)
            .expect("article-processing service is always registered");

        let outcome = breaker
            .call(|| async {
                let result = cascade.fetch(url, ctx, &policy, &[]).await;
                if result.success {
                    Ok(result)
                } else {
                    Err(IngestError::ContentQuality(
                        result.error.clone().unwrap_or_else(|| "all strategies failed".to_string()),
                    ))
                }
            })
            .await;

        match outcome {
            Ok(result) => result,
            Err(err) => FetchResult::failure(url_str, "cascade", err.to_string(), Duration::ZERO),
        }
    }
}

/// Pool of workers, each atomically dequeuing jobs from the persisted queue
/// and running them through a [`Pipeline`]. Idle polling backs off from 2s
/// to 10s after three consecutive empty polls; shutdown is cooperative via
/// a broadcast channel so in-flight jobs finish before the process exits.
pub struct WorkerPool {
    pipeline: Arc<Pipeline>,
    worker_count: usize,
}

impl WorkerPool {
    pub fn new(pipeline: Arc<Pipeline>, worker_count: usize) -> Self {
        Self { pipeline, worker_count }
    }

    pub async fn run(&self, shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static) {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut handles = Vec::with_capacity(self.worker_count);

        for worker_id in 0..self.worker_count {
            let pipeline = Arc::clone(&self.pipeline);
            let mut shutdown = shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move {
                run_worker_loop(worker_id, pipeline, &mut shutdown).await;
            }));
        }

        shutdown_signal.await;
        info!("shutdown signal received, draining workers");
        let _ = shutdown_tx.send(());

        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn run_worker_loop(worker_id: usize, pipeline: Arc<Pipeline>, shutdown: &mut broadcast::Receiver<()>) {
    info!(worker_id, "worker started");
    let idle_count = AtomicU32::new(0);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!(worker_id, "worker shutting down");
                break;
            }
            _ = async {
                let job = match pipeline.storage.dequeue_job(&worker_id_string(worker_id)).await {
                    Ok(job) => job,
                    Err(err) => {
                        error!(worker_id, error = %err, "failed to dequeue job");
                        tokio::time::sleep(IDLE_SLEEP).await;
                        return;
                    }
                };

                let Some(job) = job else {
                    let count = idle_count.fetch_add(1, Ordering::SeqCst) + 1;
                    let sleep_for = if count >= IDLE_BACKOFF_THRESHOLD { IDLE_BACKOFF_SLEEP } else { IDLE_SLEEP };
                    tokio::time::sleep(sleep_for).await;
                    return;
                };
                idle_count.store(0, Ordering::SeqCst);

                let outcome = pipeline.process_url(&job.url, &job.source).await;
                let result_json = match &outcome {
                    JobOutcome::Duplicate => serde_json::json!({ "duplicate": true }),
                    JobOutcome::Stored { title, content_pointer, length, word_count } => serde_json::json!({
                        "stored": true,
                        "title": title,
                        "content_pointer": content_pointer,
                        "length": length,
                        "word_count": word_count,
                    }),
                    JobOutcome::FallbackQueued { alternative_job_id } => {
                        serde_json::json!({ "fallback_triggered": true, "alternative_job_id": alternative_job_id })
                    }
                    JobOutcome::Escalated => serde_json::json!({ "escalated_to_nuclear": true }),
                };

                let mark_result = match outcome {
                    JobOutcome::Escalated => pipeline.storage.mark_job_failed(&job.id, "escalated to nuclear retry", MAX_JOB_RETRIES).await,
                    _ => pipeline.storage.mark_job_completed(&job.id, result_json).await,
                };
                if let Err(err) = mark_result {
                    error!(worker_id, job_id = job.id, error = %err, "failed to record job outcome");
                }
            } => {}
        }
    }
}

fn worker_id_string(worker_id: usize) -> String {
    format!("worker-{worker_id}")
}

/// Clips `text` to at most `max_chars` characters, cutting on a char
/// boundary so multi-byte UTF-8 sequences are never split.
fn clip_to_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Fans a fixed list of URLs out across bounded concurrency, running each
/// through the same pipeline a queued job would use, without going through
/// the persisted queue at all — for one-shot bulk submissions.
pub async fn bulk_process(pipeline: Arc<Pipeline>, urls: Vec<String>, concurrency: usize, source: &str) -> Vec<JobOutcome> {
    let source = source.to_string();
    stream::iter(urls.into_iter().map(move |url| {
        let pipeline = Arc::clone(&pipeline);
        let source = source.clone();
        async move { pipeline.process_url(&url, &source).await }
    }))
    .buffer_unordered(concurrency.max(1))
    .collect()
    .await
}
