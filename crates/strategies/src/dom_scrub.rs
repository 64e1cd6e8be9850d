use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use ingest_core::{Capability, FetchResult, PriorityClass, StrategyMetadata};
use url::Url;

use crate::http::{get, status_is_success};
use crate::{FetchContext, FetchStrategy};

const SCRIPT_KEYWORDS: &[&str] = &["paywall", "subscription", "premium", "auth", "login"];
const STYLE_KEYWORDS: &[&str] = &["paywall", "blur", "hidden"];

/// Fetches the page, then removes elements matching the configured paywall
/// selector set, `<style>` blocks mentioning paywall/blur/hidden rules, and
/// script tags as in [`crate::js_disabled`], before running readability on
/// what remains.
pub struct DomScrubStrategy {
    metadata: StrategyMetadata,
    user_agent: String,
    paywall_selectors: Vec<String>,
}

impl DomScrubStrategy {
    pub fn new(user_agent: String, paywall_selectors: Vec<String>) -> Self {
        Self {
            metadata: StrategyMetadata {
                name: "dom-scrub".into(),
                priority_class: PriorityClass::Medium,
                capabilities: vec![Capability::PaywallBypass],
                base_success_rate: 0.4,
                avg_response_time_secs: 2.0,
                requires_auth: false,
                has_usage_limits: false,
                remaining_usage: None,
                rate_limit_delay_secs: 0.0,
                supported_domain_suffixes: vec![],
            },
            user_agent,
            paywall_selectors,
        }
    }
}

#[async_trait]
impl FetchStrategy for DomScrubStrategy {
    fn metadata(&self) -> &StrategyMetadata {
        &self.metadata
    }

    async fn fetch(&self, url: &Url, ctx: &FetchContext) -> FetchResult {
        let start = Instant::now();
        match get(&ctx.client, url, &self.user_agent, ctx.default_timeout, ctx.max_body_size).await {
            Ok(resp) if status_is_success(resp.status) => {
                let body_str = String::from_utf8_lossy(&resp.body);
                let scrubbed = ingest_extract::html::strip_elements_matching(&body_str, &self.paywall_selectors);
                let scrubbed = ingest_extract::html::strip_styles_matching(&scrubbed, STYLE_KEYWORDS);
                let scrubbed = ingest_extract::html::strip_scripts_matching(&scrubbed, SCRIPT_KEYWORDS);
                let article = ingest_extract::extract_article(scrubbed.as_bytes(), &resp.final_url);
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
