pub mod ai_extractor;
pub mod archive_mirror;
pub mod authenticated;
pub mod bypass_proxy;
pub mod direct;
pub mod dom_scrub;
pub mod headless_browser;
pub mod http;
pub mod js_disabled;
pub mod partial_load;
pub mod reader_mode;
pub mod web_archive;

use std::time::Duration;

use async_trait::async_trait;
use ingest_core::{FetchResult, StrategyMetadata};
use url::Url;

/// Shared dependencies every strategy needs to perform I/O. Constructed once
/// per process and handed to every strategy by reference.
#[derive(Clone)]
pub struct FetchContext {
    pub client: reqwest::Client,
    pub default_timeout: Duration,
    pub max_body_size: usize,
}

impl FetchContext {
    pub fn new(default_timeout: Duration, max_body_size: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()?;
        Ok(Self {
            client,
            default_timeout,
            max_body_size,
        })
    }
}

/// Uniform contract every fetch strategy implements: `fetch(url) -> FetchResult`.
/// Strategies must never throw across this boundary — internal failures
/// become `FetchResult { success: false, error: Some(..) }`.
#[async_trait]
pub trait FetchStrategy: Send + Sync + 'static {
    fn metadata(&self) -> &StrategyMetadata;

    fn can_handle(&self, url: &Url) -> bool {
        self.metadata().can_handle(url.host_str().unwrap_or(""))
    }

    async fn fetch(&self, url: &Url, ctx: &FetchContext) -> FetchResult;
}

pub(crate) fn elapsed_since(start: std::time::Instant) -> Duration {
    start.elapsed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_handle_defaults_to_universal() {
        let meta = StrategyMetadata {
            name: "test".into(),
            priority_class: ingest_core::PriorityClass::Medium,
            capabilities: vec![],
            base_success_rate: 0.5,
            avg_response_time_secs: 1.0,
            requires_auth: false,
            has_usage_limits: false,
            remaining_usage: None,
            rate_limit_delay_secs: 0.0,
            supported_domain_suffixes: vec![],
        };
        assert!(meta.can_handle("anything.example"));
    }
}
