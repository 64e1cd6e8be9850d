use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use ingest_core::{Capability, FetchResult, IngestError, PriorityClass, StrategyMetadata};
use serde::Deserialize;
use url::Url;

use crate::http::{get, status_is_success};
use crate::{FetchContext, FetchStrategy};

#[derive(Debug, Deserialize)]
struct AvailabilityResponse {
    archived_snapshots: ArchivedSnapshots,
}

#[derive(Debug, Deserialize, Default)]
struct ArchivedSnapshots {
    closest: Option<ClosestSnapshot>,
}

#[derive(Debug, Deserialize)]
struct ClosestSnapshot {
    url: String,
    timestamp: String,
}

async fn lookup_snapshot(
    client: &reqwest::Client,
    user_agent: &str,
    timeout: std::time::Duration,
    max_body: usize,
    url: &Url,
    timestamp: Option<&str>,
) -> Result<Option<ClosestSnapshot>, IngestError> {
    let api_url = match timestamp {
        Some(ts) => format!("https://archive.org/wayback/available?url={}&timestamp={}", url, ts),
        None => format!("https://archive.org/wayback/available?url={}", url),
    };
    let api_url = Url::parse(&api_url).map_err(|e| IngestError::InvalidUrl(e.to_string()))?;

    let resp = get(client, &api_url, user_agent, timeout, max_body).await?;
    if !status_is_success(resp.status) {
        return Err(IngestError::Http {
            status: resp.status,
            message: "wayback availability API error".into(),
        });
    }
    let parsed: AvailabilityResponse =
        serde_json::from_slice(&resp.body).map_err(|e| IngestError::Network(e.to_string()))?;
    Ok(parsed.archived_snapshots.closest)
}

/// Queries the archive-availability API for the closest snapshot to the
/// current moment and fetches it.
pub struct WebArchiveLatestStrategy {
    metadata: StrategyMetadata,
    user_agent: String,
}

impl WebArchiveLatestStrategy {
    pub fn new(user_agent: String) -> Self {
        Self {
            metadata: StrategyMetadata {
                name: "web-archive-latest".into(),
                priority_class: PriorityClass::Medium,
                capabilities: vec![Capability::Archive],
                base_success_rate: 0.35,
                avg_response_time_secs: 3.0,
                requires_auth: false,
                has_usage_limits: false,
                remaining_usage: None,
                rate_limit_delay_secs: 0.0,
                supported_domain_suffixes: vec![],
            },
            user_agent,
        }
    }
}

#[async_trait]
impl FetchStrategy for WebArchiveLatestStrategy {
    fn metadata(&self) -> &StrategyMetadata {
        &self.metadata
    }

    async fn fetch(&self, url: &Url, ctx: &FetchContext) -> FetchResult {
        let start = Instant::now();
        let snapshot = match lookup_snapshot(&ctx.client, &self.user_agent, ctx.default_timeout, ctx.max_body_size, url, None).await {
            Ok(Some(s)) => s,
            Ok(None) => {
                return FetchResult::failure(url.as_str(), &self.metadata.name, "no archived snapshots found", start.elapsed());
            }
            Err(err) => {
                return FetchResult::failure(url.as_str(), &self.metadata.name, err.to_string(), start.elapsed());
            }
        };

        let snapshot_url = match Url::parse(&snapshot.url) {
            Ok(u) => u,
            Err(e) => return FetchResult::failure(url.as_str(), &self.metadata.name, e.to_string(), start.elapsed()),
        };

        match get(&ctx.client, &snapshot_url, &self.user_agent, ctx.default_timeout, ctx.max_body_size).await {
            Ok(resp) if status_is_success(resp.status) => {
                let article = ingest_extract::extract_article(&resp.body, &resp.final_url);
                let mut metadata = HashMap::new();
                metadata.insert("snapshot_url".to_string(), serde_json::json!(snapshot.url));
                metadata.insert("timestamp".to_string(), serde_json::json!(snapshot.timestamp));
                metadata.insert("raw_html".to_string(), serde_json::json!(String::from_utf8_lossy(&resp.body)));
                FetchResult {
                    success: true,
                    url: url.to_string(),
                    content: article.main_text,
                    title: Some(article.title),
                    strategy: self.metadata.name.clone(),
                    is_truncated: false,
                    metadata,
                    processing_time: resp.elapsed,
                    error: None,
                }
            }
            Ok(resp) => FetchResult::failure(url.as_str(), &self.metadata.name, format!("status {}", resp.status), resp.elapsed),
            Err(err) => FetchResult::failure(url.as_str(), &self.metadata.name, err.to_string(), start.elapsed()),
        }
    }
}

/// Same availability API as [`WebArchiveLatestStrategy`], but iterates a
/// list of target timestamps ranging from the present back ~15 years;
/// accepts the first response whose body exceeds 1000 bytes.
pub struct WebArchiveMultiTimeframeStrategy {
    metadata: StrategyMetadata,
    user_agent: String,
    timeframes: Vec<String>,
}

const MIN_ACCEPT_BYTES: usize = 1000;

impl WebArchiveMultiTimeframeStrategy {
    pub fn new(user_agent: String, timeframes: Vec<String>) -> Self {
        Self {
            metadata: StrategyMetadata {
                name: "web-archive-multi".into(),
                priority_class: PriorityClass::Low,
                capabilities: vec![Capability::Archive],
                base_success_rate: 0.25,
                avg_response_time_secs: 8.0,
                requires_auth: false,
                has_usage_limits: false,
                remaining_usage: None,
                rate_limit_delay_secs: 0.0,
                supported_domain_suffixes: vec![],
            },
            user_agent,
            timeframes,
        }
    }

    pub fn default_timeframes() -> Vec<String> {
        // Latest snapshot first, then roughly yearly steps back ~15 years.
        let mut frames = vec![String::new()];
        frames.extend(
            [2023, 2021, 2019, 2017, 2015, 2013, 2011, 2009]
                .iter()
                .map(|y| format!("{y}0101")),
        );
        frames
    }
}

#[async_trait]
impl FetchStrategy for WebArchiveMultiTimeframeStrategy {
    fn metadata(&self) -> &StrategyMetadata {
        &self.metadata
    }

    async fn fetch(&self, url: &Url, ctx: &FetchContext) -> FetchResult {
        let start = Instant::now();
        let mut last_error = "no timeframes configured".to_string();

        for timeframe in &self.timeframes {
            let ts = if timeframe.is_empty() { None } else { Some(timeframe.as_str()) };
            let snapshot = match lookup_snapshot(&ctx.client, &self.user_agent, ctx.default_timeout, ctx.max_body_size, url, ts).await {
                Ok(Some(s)) => s,
                Ok(None) => {
                    last_error = format!("no snapshot for timeframe {}", if timeframe.is_empty() { "latest" } else { timeframe });
                    continue;
                }
                Err(err) => {
                    last_error = err.to_string();
                    continue;
                }
            };

            let snapshot_url = match Url::parse(&snapshot.url) {
                Ok(u) => u,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            match get(&ctx.client, &snapshot_url, &self.user_agent, ctx.default_timeout, ctx.max_body_size).await {
                Ok(resp) if status_is_success(resp.status) && resp.body.len() > MIN_ACCEPT_BYTES => {
                    let article = ingest_extract::extract_article(&resp.body, &resp.final_url);
                    let mut metadata = HashMap::new();
                    metadata.insert("snapshot_url".to_string(), serde_json::json!(snapshot.url));
                    metadata.insert("timeframe_used".to_string(), serde_json::json!(if timeframe.is_empty() { "latest".to_string() } else { timeframe.clone() }));
                    metadata.insert("raw_html".to_string(), serde_json::json!(String::from_utf8_lossy(&resp.body)));
                    return FetchResult {
                        success: true,
                        url: url.to_string(),
                        content: article.main_text,
                        title: Some(article.title),
                        strategy: self.metadata.name.clone(),
                        is_truncated: false,
                        metadata,
                        processing_time: resp.elapsed,
                        error: None,
                    };
                }
                Ok(resp) => {
                    last_error = format!("snapshot too short: {} bytes", resp.body.len());
                }
                Err(err) => {
                    last_error = err.to_string();
                }
            }
        }

        FetchResult::failure(url.as_str(), &self.metadata.name, last_error, crate::elapsed_since(start))
    }
}
