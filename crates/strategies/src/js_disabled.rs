use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use ingest_core::{Capability, FetchResult, PriorityClass, StrategyMetadata};
use url::Url;

use crate::http::{get, status_is_success};
use crate::{FetchContext, FetchStrategy};

const SCRIPT_KEYWORDS: &[&str] = &["paywall", "subscription", "premium", "auth", "login"];

/// Fetches the page, strips `<script>` tags that mention paywall/auth
/// keywords (the scripts most likely to hide or gate content client-side),
/// then runs the readability extractor on what remains.
pub struct JsDisabledStrategy {
    metadata: StrategyMetadata,
    user_agent: String,
}

impl JsDisabledStrategy {
    pub fn new(user_agent: String) -> Self {
        Self {
            metadata: StrategyMetadata {
                name: "js-disabled".into(),
                priority_class: PriorityClass::Medium,
                capabilities: vec![Capability::PaywallBypass],
                base_success_rate: 0.4,
                avg_response_time_secs: 1.8,
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
impl FetchStrategy for JsDisabledStrategy {
    fn metadata(&self) -> &StrategyMetadata {
        &self.metadata
    }

    async fn fetch(&self, url: &Url, ctx: &FetchContext) -> FetchResult {
        let start = Instant::now();
        match get(&ctx.client, url, &self.user_agent, ctx.default_timeout, ctx.max_body_size).await {
            Ok(resp) if status_is_success(resp.status) => {
                let body_str = String::from_utf8_lossy(&resp.body);
                let stripped = ingest_extract::html::strip_scripts_matching(&body_str, SCRIPT_KEYWORDS);
                let article = ingest_extract::extract_article(stripped.as_bytes(), &resp.final_url);
                let mut metadata = HashMap::new();
                metadata.insert("raw_html".to_string(), serde_json::json!(body_str.as_ref()));
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
