pub mod stats;

use std::sync::Arc;

use ingest_analyzer::{analyze, AnalyzerPolicy};
use ingest_core::FetchResult;
use ingest_strategies::{FetchContext, FetchStrategy};
use url::Url;

pub use stats::{AttemptOutcome, StrategyStats, StrategyStatsTable};

/// Owns the full strategy roster and the persisted statistics table that
/// orders dispatch. One instance is shared (via `Arc`) across every worker.
pub struct Cascade {
    strategies: Vec<Arc<dyn FetchStrategy>>,
    stats: Arc<StrategyStatsTable>,
}

impl Cascade {
    pub fn new(strategies: Vec<Arc<dyn FetchStrategy>>, stats: Arc<StrategyStatsTable>) -> Self {
        Self { strategies, stats }
    }

    pub fn stats(&self) -> &Arc<StrategyStatsTable> {
        &self.stats
    }

    /// Orders the roster for one dispatch: the caller's preferred list
    /// (deduplicated, order preserved) first, then every other registered
    /// strategy sorted by observed success rate descending. Strategies that
    /// can't handle this URL, or have exhausted their usage ceiling, are
    /// dropped entirely.
    fn ordered_strategies(&self, url: &Url, preferred: &[String]) -> Vec<Arc<dyn FetchStrategy>> {
        let mut seen = std::collections::HashSet::new();
        let mut ordered = Vec::new();

        for name in preferred {
            if let Some(strategy) = self.strategies.iter().find(|s| &s.metadata().name == name) {
                if seen.insert(name.clone()) {
                    ordered.push(strategy.clone());
                }
            }
        }

        let mut rest: Vec<Arc<dyn FetchStrategy>> = self
            .strategies
            .iter()
            .filter(|s| !seen.contains(&s.metadata().name))
            .cloned()
            .collect();

        rest.sort_by(|a, b| {
            let rate_a = self.stats.stats_for(&a.metadata().name).observed_rate(a.metadata().base_success_rate);
            let rate_b = self.stats.stats_for(&b.metadata().name).observed_rate(b.metadata().base_success_rate);
            rate_b.partial_cmp(&rate_a).unwrap_or(std::cmp::Ordering::Equal)
        });

        ordered.extend(rest);

        ordered
            .into_iter()
            .filter(|s| s.can_handle(url))
            .filter(|s| !is_usage_exhausted(s.as_ref()))
            .collect()
    }

    /// Runs the cascade for one URL: walks the ordered strategy list, stopping
    /// at the first attempt that succeeds and whose content the analyzer does
    /// not flag as truncated. Every attempt updates the persisted statistics
    /// table, win or lose.
    pub async fn fetch(&self, url: &Url, ctx: &FetchContext, policy: &AnalyzerPolicy<'_>, preferred: &[String]) -> FetchResult {
        let candidates = self.ordered_strategies(url, preferred);
        let mut last_result: Option<FetchResult> = None;

        for strategy in candidates {
            let name = strategy.metadata().name.clone();
            let result = strategy.fetch(url, ctx).await;
            let elapsed_secs = Some(result.processing_time.as_secs_f64());

            if !result.success {
                self.stats.record(&name, AttemptOutcome::Failure, elapsed_secs).await;
                last_result = Some(result);
                continue;
            }

            let raw_html = result
                .metadata
                .get("raw_html")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let verdict = analyze(raw_html, policy, &result.content);

            if verdict.is_truncated {
                self.stats.record(&name, AttemptOutcome::Truncated, elapsed_secs).await;
                last_result = Some(result);
                continue;
            }

            self.stats.record(&name, AttemptOutcome::Success, elapsed_secs).await;
            return result;
        }

        last_result.unwrap_or_else(|| {
            FetchResult::failure(url.as_str(), "cascade", "no strategy could handle this url", std::time::Duration::ZERO)
        })
    }
}

fn is_usage_exhausted(strategy: &dyn FetchStrategy) -> bool {
    let meta = strategy.metadata();
    meta.has_usage_limits && meta.remaining_usage == Some(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ingest_core::{Capability, PriorityClass, StrategyMetadata};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubStrategy {
        meta: StrategyMetadata,
        calls: AtomicUsize,
        succeed: bool,
    }

    #[async_trait]
    impl FetchStrategy for StubStrategy {
        fn metadata(&self) -> &StrategyMetadata {
            &self.meta
        }

        async fn fetch(&self, url: &Url, _ctx: &FetchContext) -> FetchResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                FetchResult {
                    success: true,
                    url: url.to_string(),
                    content: "word ".repeat(400),
                    title: Some("headline".into()),
                    strategy: self.meta.name.clone(),
                    is_truncated: false,
                    metadata: Default::default(),
                    processing_time: Duration::from_millis(5),
                    error: None,
                }
            } else {
                FetchResult::failure(url.as_str(), &self.meta.name, "stub failure", Duration::from_millis(1))
            }
        }
    }

    fn meta(name: &str, base_rate: f64) -> StrategyMetadata {
        StrategyMetadata {
            name: name.into(),
            priority_class: PriorityClass::Medium,
            capabilities: vec![Capability::BasicFetch],
            base_success_rate: base_rate,
            avg_response_time_secs: 1.0,
            requires_auth: false,
            has_usage_limits: false,
            remaining_usage: None,
            rate_limit_delay_secs: 0.0,
            supported_domain_suffixes: vec![],
        }
    }

    fn policy() -> AnalyzerPolicy<'static> {
        use once_cell::sync::Lazy;
        static PHRASES: Lazy<Vec<String>> = Lazy::new(Vec::new);
        static SELECTORS: Lazy<Vec<String>> = Lazy::new(Vec::new);
        AnalyzerPolicy {
            paywall_phrases: &PHRASES,
            paywall_selectors: &SELECTORS,
            min_word_count: 150,
            title_ratio_threshold: 0.5,
        }
    }

    #[tokio::test]
    async fn falls_through_to_next_strategy_on_failure() {
        let failing = Arc::new(StubStrategy { meta: meta("first", 0.9), calls: AtomicUsize::new(0), succeed: false });
        let succeeding = Arc::new(StubStrategy { meta: meta("second", 0.1), calls: AtomicUsize::new(0), succeed: true });
        let cascade = Cascade::new(vec![failing.clone(), succeeding.clone()], StrategyStatsTable::load(std::env::temp_dir().join(format!("cascade-test-{}.json", std::process::id()))).await);

        let url = Url::parse("https://example.com/article").unwrap();
        let ctx = FetchContext::new(Duration::from_secs(5), 1024 * 1024).unwrap();
        let result = cascade.fetch(&url, &ctx, &policy(), &[]).await;

        assert!(result.success);
        assert_eq!(result.strategy, "second");
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(succeeding.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preferred_list_takes_priority_over_observed_rate() {
        let high_rate = Arc::new(StubStrategy { meta: meta("high", 0.9), calls: AtomicUsize::new(0), succeed: true });
        let low_rate = Arc::new(StubStrategy { meta: meta("low", 0.1), calls: AtomicUsize::new(0), succeed: true });
        let cascade = Cascade::new(vec![high_rate.clone(), low_rate.clone()], StrategyStatsTable::load(std::env::temp_dir().join(format!("cascade-test-pref-{}.json", std::process::id()))).await);

        let url = Url::parse("https://example.com/article").unwrap();
        let ctx = FetchContext::new(Duration::from_secs(5), 1024 * 1024).unwrap();
        let result = cascade.fetch(&url, &ctx, &policy(), &["low".to_string()]).await;

        assert_eq!(result.strategy, "low");
        assert_eq!(low_rate.calls.load(Ordering::SeqCst), 1);
        assert_eq!(high_rate.calls.load(Ordering::SeqCst), 0);
    }
}
