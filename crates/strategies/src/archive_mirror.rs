use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use ingest_core::{Capability, FetchResult, PriorityClass, StrategyMetadata};
use rand::Rng;
use url::Url;

use crate::http::{get, status_is_success};
use crate::{FetchContext, FetchStrategy};

/// Iterates a list of archive-host mirror domains. For each: look up an
/// existing snapshot; if present and served from that mirror, accept.
/// Otherwise, on the first mirror only, submit the page for archival, wait
/// 5s, and retry the lookup. A 429 skips straight to the next mirror.
pub struct ArchiveMirrorStrategy {
    metadata: StrategyMetadata,
    mirrors: Vec<String>,
    user_agent: String,
}

impl ArchiveMirrorStrategy {
    pub fn new(mirrors: Vec<String>, user_agent: String) -> Self {
        Self {
            metadata: StrategyMetadata {
                name: "archive-mirror".into(),
                priority_class: PriorityClass::Medium,
                capabilities: vec![Capability::Archive],
                base_success_rate: 0.35,
                avg_response_time_secs: 6.0,
                requires_auth: false,
                has_usage_limits: false,
                remaining_usage: None,
                rate_limit_delay_secs: 2.0,
                supported_domain_suffixes: vec![],
            },
            mirrors,
            user_agent,
        }
    }

    fn mirror_url(&self, mirror: &str, url: &Url) -> Option<Url> {
        Url::parse(&format!("https://{mirror}/{}", url.as_str())).ok()
    }
}

#[async_trait]
impl FetchStrategy for ArchiveMirrorStrategy {
    fn metadata(&self) -> &StrategyMetadata {
        &self.metadata
    }

    async fn fetch(&self, url: &Url, ctx: &FetchContext) -> FetchResult {
        let start = Instant::now();
        let mut last_error = "no mirrors configured".to_string();

        for (idx, mirror) in self.mirrors.iter().enumerate() {
            let delay_ms = rand::thread_rng().gen_range(1000..=3000);
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;

            let Some(mirror_url) = self.mirror_url(mirror, url) else {
                continue;
            };

            let lookup = get(&ctx.client, &mirror_url, &self.user_agent, ctx.default_timeout, ctx.max_body_size).await;
            match lookup {
                Ok(resp) if resp.status == 429 => {
                    last_error = "rate limited by mirror".to_string();
                    continue;
                }
                Ok(resp) if status_is_success(resp.status) && resp.final_url.host_str() == Some(mirror.as_str()) => {
                    let article = ingest_extract::extract_article(&resp.body, &resp.final_url);
                    let mut metadata = HashMap::new();
                    metadata.insert("mirror".to_string(), serde_json::json!(mirror));
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
                    last_error = format!("no snapshot yet: status {}", resp.status);
                }
                Err(err) => {
                    last_error = err.to_string();
                }
            }

            if idx == 0 {
                // Submit for archival on the first mirror only, then retry the lookup once.
                let _ = get(&ctx.client, &mirror_url, &self.user_agent, ctx.default_timeout, ctx.max_body_size).await;
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;

                if let Ok(resp) = get(&ctx.client, &mirror_url, &self.user_agent, ctx.default_timeout, ctx.max_body_size).await {
                    if status_is_success(resp.status) {
                        let article = ingest_extract::extract_article(&resp.body, &resp.final_url);
                        let mut metadata = HashMap::new();
                        metadata.insert("mirror".to_string(), serde_json::json!(mirror));
                        metadata.insert("submitted".to_string(), serde_json::json!(true));
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
                }
            }
        }

        FetchResult::failure(url.as_str(), &self.metadata.name, last_error, crate::elapsed_since(start))
    }
}
