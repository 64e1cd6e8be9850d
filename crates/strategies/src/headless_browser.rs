use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptionsBuilder};
use ingest_core::{Capability, FetchResult, PriorityClass, StrategyMetadata};
use url::Url;

use crate::{FetchContext, FetchStrategy};

const LOADING_MARKERS: &[&str] = &[
    "loading",
    "please wait",
    "checking your browser",
    "ddos protection",
    "cloudflare",
];

fn render_blocking(url: String, wait_secs: u64) -> Result<String, String> {
    let launch_options = LaunchOptionsBuilder::default()
        .headless(true)
        .window_size(Some((1920, 1080)))
        .args(vec![
            std::ffi::OsStr::new("--no-sandbox"),
            std::ffi::OsStr::new("--disable-dev-shm-usage"),
            std::ffi::OsStr::new("--disable-gpu"),
        ])
        .build()
        .map_err(|e| e.to_string())?;

    let browser = Browser::new(launch_options).map_err(|e| e.to_string())?;
    let tab = browser.new_tab().map_err(|e| e.to_string())?;

    tab.navigate_to(&url).map_err(|e| e.to_string())?;
    tab.wait_until_navigated().map_err(|e| e.to_string())?;

    let wait_start = Instant::now();
    let max_wait = Duration::from_secs(wait_secs);
    loop {
        if wait_start.elapsed() > max_wait {
            return Err("timeout waiting for dynamic content".to_string());
        }

        let html = tab.get_content().map_err(|e| e.to_string())?;
        let html_lower = html.to_lowercase();
        let is_loading = LOADING_MARKERS.iter().any(|m| html_lower.contains(m));
        let has_content = html.len() > 5000 || html_lower.contains("<article") || html_lower.contains("<p");

        if !is_loading && has_content {
            return Ok(html);
        }
        std::thread::sleep(Duration::from_millis(500));
    }
}

/// Renders the page in a headless Chrome instance to obtain the
/// fully-JavaScript-executed DOM, for sites whose content never appears in
/// the raw HTTP response. The blocking `headless_chrome` API runs on a
/// dedicated blocking thread; this is the slowest and most resource-heavy
/// strategy in the cascade and should sit near the back of the ordering.
pub struct HeadlessBrowserStrategy {
    metadata: StrategyMetadata,
    wait_for_content_secs: u64,
}

impl HeadlessBrowserStrategy {
    pub fn new(wait_for_content_secs: u64) -> Self {
        Self {
            metadata: StrategyMetadata {
                name: "headless-browser".into(),
                priority_class: PriorityClass::Fallback,
                capabilities: vec![Capability::JsRender],
                base_success_rate: 0.5,
                avg_response_time_secs: 12.0,
                requires_auth: false,
                has_usage_limits: false,
                remaining_usage: None,
                rate_limit_delay_secs: 0.0,
                supported_domain_suffixes: vec![],
            },
            wait_for_content_secs,
        }
    }
}

#[async_trait]
impl FetchStrategy for HeadlessBrowserStrategy {
    fn metadata(&self) -> &StrategyMetadata {
        &self.metadata
    }

    async fn fetch(&self, url: &Url, _ctx: &FetchContext) -> FetchResult {
        let start = Instant::now();
        let url_str = url.to_string();
        let wait_secs = self.wait_for_content_secs;

        let rendered = tokio::task::spawn_blocking(move || render_blocking(url_str, wait_secs)).await;

        match rendered {
            Ok(Ok(html)) => {
                let article = ingest_extract::extract_article(html.as_bytes(), url);
                let mut metadata = HashMap::new();
                metadata.insert("raw_html".to_string(), serde_json::json!(html));
                FetchResult {
                    success: true,
                    url: url.to_string(),
                    content: article.main_text,
                    title: Some(article.title),
                    strategy: self.metadata.name.clone(),
                    is_truncated: false,
                    metadata,
                    processing_time: start.elapsed(),
                    error: None,
                }
            }
            Ok(Err(err)) => FetchResult::failure(url.as_str(), &self.metadata.name, err, start.elapsed()),
            Err(join_err) => FetchResult::failure(url.as_str(), &self.metadata.name, join_err.to_string(), start.elapsed()),
        }
    }
}
