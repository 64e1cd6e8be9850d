use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use ingest_core::{Capability, FetchResult, PriorityClass, StrategyMetadata};
use url::Url;

use crate::http::{get, status_is_success};
use crate::{FetchContext, FetchStrategy};

/// Plain HTTP GET with a desktop user-agent, following redirects, raising on
/// non-2xx. The baseline every other strategy falls back from.
pub struct DirectFetchStrategy {
    metadata: StrategyMetadata,
    user_agent: String,
}

impl DirectFetchStrategy {
    pub fn new(user_agent: String) -> Self {
        Self {
            metadata: StrategyMetadata {
                name: "direct".into(),
                priority_class: PriorityClass::Highest,
                capabilities: vec![Capability::BasicFetch],
                base_success_rate: 0.6,
                avg_response_time_secs: 1.5,
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
impl FetchStrategy for DirectFetchStrategy {
    fn metadata(&self) -> &StrategyMetadata {
        &self.metadata
    }

    async fn fetch(&self, url: &Url, ctx: &FetchContext) -> FetchResult {
        fetch_plain(&self.metadata.name, &self.user_agent, url, ctx).await
    }
}

/// "Search-engine-bot spoof" — identical to direct fetch but with a
/// Googlebot-style user-agent, relying on sites that serve full content to
/// known crawlers.
pub struct BotSpoofStrategy {
    metadata: StrategyMetadata,
    user_agent: String,
}

impl BotSpoofStrategy {
    pub fn new(user_agent: String) -> Self {
        Self {
            metadata: StrategyMetadata {
                name: "bot-spoof".into(),
                priority_class: PriorityClass::High,
                capabilities: vec![Capability::BasicFetch],
                base_success_rate: 0.4,
                avg_response_time_secs: 1.5,
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
impl FetchStrategy for BotSpoofStrategy {
    fn metadata(&self) -> &StrategyMetadata {
        &self.metadata
    }

    async fn fetch(&self, url: &Url, ctx: &FetchContext) -> FetchResult {
        fetch_plain(&self.metadata.name, &self.user_agent, url, ctx).await
    }
}

pub(crate) async fn fetch_plain(
    strategy_name: &str,
    user_agent: &str,
    url: &Url,
    ctx: &FetchContext,
) -> FetchResult {
    let start = Instant::now();
    match get(&ctx.client, url, user_agent, ctx.default_timeout, ctx.max_body_size).await {
        Ok(resp) if status_is_success(resp.status) => {
            let article = ingest_extract::extract_article(&resp.body, &resp.final_url);
            let mut metadata = HashMap::new();
            metadata.insert("raw_html".to_string(), serde_json::json!(String::from_utf8_lossy(&resp.body)));
            FetchResult {
                success: true,
                url: url.to_string(),
                content: article.main_text,
                title: Some(article.title),
                strategy: strategy_name.to_string(),
                is_truncated: false,
                metadata,
                processing_time: resp.elapsed,
                error: None,
            }
        }
        Ok(resp) => FetchResult::failure(
            url.as_str(),
            strategy_name,
            format!("non-2xx status {}", resp.status),
            resp.elapsed,
        ),
        Err(err) => FetchResult::failure(url.as_str(), strategy_name, err.to_string(), crate::elapsed_since(start)),
    }
}
