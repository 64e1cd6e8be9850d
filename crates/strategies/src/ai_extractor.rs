use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use ingest_core::{Capability, FetchResult, PriorityClass, StrategyMetadata};
use ingest_resilience::persist;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use url::Url;

use crate::{FetchContext, FetchStrategy};

#[derive(Debug, Serialize, Deserialize)]
struct UsageData {
    month: String,
    usage_count: u64,
    total_used: u64,
    successful_requests: u64,
    failed_requests: u64,
}

impl UsageData {
    fn fresh(month: &str) -> Self {
        Self {
            month: month.to_string(),
            usage_count: 0,
            total_used: 0,
            successful_requests: 0,
            failed_requests: 0,
        }
    }
}

fn current_month() -> String {
    let now = Utc::now();
    format!("{:04}-{:02}", now.year(), now.month())
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    data: Option<ScrapeData>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    markdown: Option<String>,
    html: Option<String>,
    metadata: Option<ScrapeMetadata>,
}

#[derive(Debug, Deserialize)]
struct ScrapeMetadata {
    title: Option<String>,
}

/// Last-resort extraction via a hosted scraping API, reserved for pages
/// every other strategy has failed on. Tracks usage against a persisted
/// monthly quota so the account never gets billed past the configured
/// limit; the counter resets automatically on the first call of a new
/// calendar month.
pub struct AiExtractorStrategy {
    metadata: StrategyMetadata,
    api_key: Option<String>,
    base_url: String,
    monthly_limit: u64,
    usage_path: PathBuf,
    usage: Mutex<Option<UsageData>>,
}

impl AiExtractorStrategy {
    pub fn new(api_key: Option<String>, monthly_limit: u64, data_dir: &str) -> Self {
        Self {
            metadata: StrategyMetadata {
                name: "ai-extractor".into(),
                priority_class: PriorityClass::Fallback,
                capabilities: vec![Capability::AiExtract],
                base_success_rate: 0.6,
                avg_response_time_secs: 10.0,
                requires_auth: true,
                has_usage_limits: true,
                remaining_usage: Some(monthly_limit),
                rate_limit_delay_secs: 0.0,
                supported_domain_suffixes: vec![],
            },
            api_key,
            base_url: "https://api.firecrawl.dev/v0".to_string(),
            monthly_limit,
            usage_path: PathBuf::from(data_dir).join("firecrawl_usage.json"),
            usage: Mutex::new(None),
        }
    }

    async fn load_usage(&self) -> UsageData {
        let month = current_month();
        let mut guard = self.usage.lock().await;
        if let Some(existing) = guard.as_ref() {
            if existing.month == month {
                return UsageData {
                    month: existing.month.clone(),
                    usage_count: existing.usage_count,
                    total_used: existing.total_used,
                    successful_requests: existing.successful_requests,
                    failed_requests: existing.failed_requests,
                };
            }
        }

        let loaded = persist::load_json::<UsageData>(&self.usage_path).await;
        let data = match loaded {
            Some(data) if data.month == month => data,
            Some(data) => UsageData {
                total_used: data.total_used,
                ..UsageData::fresh(&month)
            },
            None => UsageData::fresh(&month),
        };
        *guard = Some(UsageData {
            month: data.month.clone(),
            usage_count: data.usage_count,
            total_used: data.total_used,
            successful_requests: data.successful_requests,
            failed_requests: data.failed_requests,
        });
        data
    }

    async fn record_usage(&self, successful: bool) {
        let mut data = self.load_usage().await;
        data.usage_count += 1;
        data.total_used += 1;
        if successful {
            data.successful_requests += 1;
        } else {
            data.failed_requests += 1;
        }
        let _ = persist::save_json(&self.usage_path, &data).await;
        *self.usage.lock().await = Some(data);
    }
}

#[async_trait]
impl FetchStrategy for AiExtractorStrategy {
    fn metadata(&self) -> &StrategyMetadata {
        &self.metadata
    }

    async fn fetch(&self, url: &Url, ctx: &FetchContext) -> FetchResult {
        let start = Instant::now();

        let Some(api_key) = self.api_key.as_ref() else {
            return FetchResult::failure(url.as_str(), &self.metadata.name, "ai extractor api key not configured", start.elapsed());
        };

        let usage = self.load_usage().await;
        if usage.usage_count >= self.monthly_limit {
            return FetchResult::failure(
                url.as_str(),
                &self.metadata.name,
                format!("monthly usage limit exceeded: {}/{}", usage.usage_count, self.monthly_limit),
                start.elapsed(),
            );
        }

        let payload = serde_json::json!({
            "url": url.as_str(),
            "formats": ["markdown", "html"],
            "includeTags": ["title", "meta", "article", "main", "content"],
            "excludeTags": ["nav", "footer", "aside", "ads"],
            "waitFor": 2000,
            "timeout": 30000,
        });

        let response = ctx
            .client
            .post(format!("{}/scrape", self.base_url))
            .bearer_auth(api_key)
            .json(&payload)
            .timeout(std::time::Duration::from_secs(45))
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(err) => {
                self.record_usage(false).await;
                return FetchResult::failure(url.as_str(), &self.metadata.name, err.to_string(), start.elapsed());
            }
        };

        let status = response.status();
        self.record_usage(status.is_success()).await;

        if !status.is_success() {
            return FetchResult::failure(url.as_str(), &self.metadata.name, format!("api error: status {status}"), start.elapsed());
        }

        let parsed: ScrapeResponse = match response.json().await {
            Ok(p) => p,
            Err(err) => return FetchResult::failure(url.as_str(), &self.metadata.name, err.to_string(), start.elapsed()),
        };

        let Some(data) = parsed.data else {
            return FetchResult::failure(url.as_str(), &self.metadata.name, "empty scrape response", start.elapsed());
        };

        let content = data.markdown.unwrap_or_default();
        if content.trim().is_empty() {
            return FetchResult::failure(url.as_str(), &self.metadata.name, "scrape returned no content", start.elapsed());
        }

        let title = data.metadata.and_then(|m| m.title);
        let mut metadata = HashMap::new();
        if let Some(html) = data.html {
            metadata.insert("raw_html".to_string(), serde_json::json!(html));
        }

        FetchResult {
            success: true,
            url: url.to_string(),
            content,
            title,
            strategy: self.metadata.name.clone(),
            is_truncated: false,
            metadata,
            processing_time: start.elapsed(),
            error: None,
        }
    }
}

