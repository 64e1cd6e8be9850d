use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use ingest_core::{Capability, FetchResult, PriorityClass, StrategyMetadata};
use url::Url;

use crate::http::{get, status_is_success};
use crate::{FetchContext, FetchStrategy};

/// Direct fetch with a reader-bot user-agent, then runs the readability-style
/// extractor and accepts only if the main-body word count clears the
/// configured minimum.
pub struct ReaderModeStrategy {
    metadata: StrategyMetadata,
    user_agent: String,
    min_word_count: usize,
}

impl ReaderModeStrategy {
    pub fn new(user_agent: String, min_word_count: usize) -> Self {
        Self {
            metadata: StrategyMetadata {
                name: "reader-mode".into(),
                priority_class: PriorityClass::Medium,
                capabilities: vec![Capability::BasicFetch],
                base_success_rate: 0.45,
                avg_response_time_secs: 2.0,
                requires_auth: false,
                has_usage_limits: false,
                remaining_usage: None,
                rate_limit_delay_secs: 0.0,
                supported_domain_suffixes: vec![],
            },
            user_agent,
            min_word_count,
        }
    }
}

#[async_trait]
impl FetchStrategy for ReaderModeStrategy {
    fn metadata(&self) -> &StrategyMetadata {
        &self.metadata
    }

    async fn fetch(&self, url: &Url, ctx: &FetchContext) -> FetchResult {
        let start = Instant::now();
        match get(&ctx.client, url, &self.user_agent, ctx.default_timeout, ctx.max_body_size).await {
            Ok(resp) if status_is_success(resp.status) => {
                let article = ingest_extract::extract_article(&resp.body, &resp.final_url);
                if article.word_count < self.min_word_count {
                    return FetchResult::failure(
                        url.as_str(),
                        &self.metadata.name,
                        format!("summary too short: {} words", article.word_count),
                        resp.elapsed,
                    );
                }
                let mut metadata = HashMap::new();
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
            Err(err) => FetchResult::failure(url.as_str(), &self.metadata.name, err.to_string(), crate::elapsed_since(start)),
        }
    }
}
