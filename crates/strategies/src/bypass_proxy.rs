use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use ingest_core::{Capability, FetchResult, PriorityClass, StrategyMetadata};
use rand::Rng;
use url::Url;

use crate::http::{get, status_is_success};
use crate::{FetchContext, FetchStrategy};

/// Iterates a configured list of paywall-bypass proxy URL templates (each a
/// format string containing `{url}`). Accepts the first response longer
/// than 1000 bytes; reports the proxy that succeeded.
pub struct BypassProxyStrategy {
    metadata: StrategyMetadata,
    templates: Vec<String>,
    user_agent: String,
}

const MIN_ACCEPT_BYTES: usize = 1000;

impl BypassProxyStrategy {
    pub fn new(templates: Vec<String>, user_agent: String) -> Self {
        Self {
            metadata: StrategyMetadata {
                name: "bypass-proxy".into(),
                priority_class: PriorityClass::High,
                capabilities: vec![Capability::PaywallBypass],
                base_success_rate: 0.3,
                avg_response_time_secs: 4.0,
                requires_auth: false,
                has_usage_limits: false,
                remaining_usage: None,
                rate_limit_delay_secs: 3.5,
                supported_domain_suffixes: vec![],
            },
            templates,
            user_agent,
        }
    }
}

#[async_trait]
impl FetchStrategy for BypassProxyStrategy {
    fn metadata(&self) -> &StrategyMetadata {
        &self.metadata
    }

    async fn fetch(&self, url: &Url, ctx: &FetchContext) -> FetchResult {
        let start = Instant::now();
        let mut last_error = "no proxies configured".to_string();

        for template in &self.templates {
            let delay_ms = rand::thread_rng().gen_range(2000..=5000);
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;

            let templated = template.replace("{url}", url.as_str());
            let templated_url = match Url::parse(&templated) {
                Ok(u) => u,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            match get(&ctx.client, &templated_url, &self.user_agent, ctx.default_timeout, ctx.max_body_size).await {
                Ok(resp) if status_is_success(resp.status) && resp.body.len() > MIN_ACCEPT_BYTES => {
                    let article = ingest_extract::extract_article(&resp.body, &resp.final_url);
                    let mut metadata = HashMap::new();
                    metadata.insert("proxy_template".to_string(), serde_json::json!(template));
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
                    last_error = format!("rejected: status {} len {}", resp.status, resp.body.len());
                }
                Err(err) => {
                    last_error = err.to_string();
                }
            }
        }

        FetchResult::failure(url.as_str(), &self.metadata.name, last_error, crate::elapsed_since(start))
    }
}
