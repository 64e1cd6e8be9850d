use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use ingest_core::{Capability, FetchResult, IngestError, PriorityClass, StrategyMetadata};
use url::Url;

use crate::{FetchContext, FetchStrategy};

const TIMEOUT: Duration = Duration::from_secs(3);
const MAX_BYTES: usize = 100 * 1024;

/// Streams the response body with a short timeout and a small byte cap,
/// accepting whatever was read so far if the timeout fires before the
/// response completed (as long as something was received).
pub struct PartialLoadStrategy {
    metadata: StrategyMetadata,
    user_agent: String,
}

impl PartialLoadStrategy {
    pub fn new(user_agent: String) -> Self {
        Self {
            metadata: StrategyMetadata {
                name: "partial-load".into(),
                priority_class: PriorityClass::Low,
                capabilities: vec![Capability::BasicFetch],
                base_success_rate: 0.25,
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
impl FetchStrategy for PartialLoadStrategy {
    fn metadata(&self) -> &StrategyMetadata {
        &self.metadata
    }

    async fn fetch(&self, url: &Url, ctx: &FetchContext) -> FetchResult {
        let start = Instant::now();

        let response = match ctx
            .client
            .get(url.clone())
            .header("User-Agent", &self.user_agent)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                let err = if e.is_timeout() {
                    IngestError::Timeout(TIMEOUT.as_secs())
                } else {
                    IngestError::Network(e.to_string())
                };
                return FetchResult::failure(url.as_str(), &self.metadata.name, err.to_string(), start.elapsed());
            }
        };

        let status = response.status();
        let final_url = response.url().clone();
        let mut buf: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();

        let read_result = tokio::time::timeout(TIMEOUT, async {
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        buf.extend_from_slice(&bytes);
                        if buf.len() >= MAX_BYTES {
                            buf.truncate(MAX_BYTES);
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        })
        .await;

        let timed_out = read_result.is_err();

        if !status.is_success() && buf.is_empty() {
            return FetchResult::failure(
                url.as_str(),
                &self.metadata.name,
                format!("status {status}"),
                start.elapsed(),
            );
        }

        if buf.is_empty() {
            return FetchResult::failure(
                url.as_str(),
                &self.metadata.name,
                if timed_out { "timed out with no body" } else { "empty body" }.to_string(),
                start.elapsed(),
            );
        }

        let article = ingest_extract::extract_article(&buf, &final_url);
        let mut metadata = HashMap::new();
        if timed_out {
            metadata.insert("timed_out".to_string(), serde_json::json!(true));
        }
        metadata.insert("raw_html".to_string(), serde_json::json!(String::from_utf8_lossy(&buf)));
        FetchResult {
            success: true,
            url: url.to_string(),
            content: article.main_text,
            title: Some(article.title),
            strategy: self.metadata.name.clone(),
            is_truncated: timed_out || buf.len() >= MAX_BYTES,
            metadata,
            processing_time: start.elapsed(),
            error: None,
        }
    }
}
