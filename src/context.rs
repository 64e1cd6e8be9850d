use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ingest_cascade::{Cascade, StrategyStatsTable};
use ingest_core::config::AppConfig;
use ingest_nuclear::NuclearRetryStore;
use ingest_resilience::{CircuitBreaker, CircuitBreakerConfig, ResilienceRegistry, RetryPolicy};
use ingest_search::{RateLimiter, SearchFallbackService, SearchQueue};
use ingest_storage::Storage;
use ingest_strategies::ai_extractor::AiExtractorStrategy;
use ingest_strategies::archive_mirror::ArchiveMirrorStrategy;
use ingest_strategies::authenticated::AuthenticatedStrategy;
use ingest_strategies::bypass_proxy::BypassProxyStrategy;
use ingest_strategies::direct::{BotSpoofStrategy, DirectFetchStrategy};
use ingest_strategies::dom_scrub::DomScrubStrategy;
use ingest_strategies::headless_browser::HeadlessBrowserStrategy;
use ingest_strategies::js_disabled::JsDisabledStrategy;
use ingest_strategies::partial_load::PartialLoadStrategy;
use ingest_strategies::reader_mode::ReaderModeStrategy;
use ingest_strategies::web_archive::{WebArchiveLatestStrategy, WebArchiveMultiTimeframeStrategy};
use ingest_strategies::{FetchContext, FetchStrategy};
use ingest_worker::Pipeline;

/// Every long-lived service the binary needs, constructed once at startup
/// from [`AppConfig`] and handed out by reference to whichever command is
/// running.
pub struct AppContext {
    pub config: AppConfig,
    pub storage: Storage,
    pub registry: Arc<ResilienceRegistry>,
    pub pipeline: Arc<Pipeline>,
}

const HEADLESS_WAIT_SECS: u64 = 3;

fn session_ttl(config: &AppConfig) -> Duration {
    Duration::from_secs(config.strategies.session_ttl_hours * 3600)
}

fn archive_timeframes(config: &AppConfig) -> Vec<String> {
    if config.strategies.archive_timeframes.is_empty() {
        WebArchiveMultiTimeframeStrategy::default_timeframes()
    } else {
        config.strategies.archive_timeframes.clone()
    }
}

/// Builds the full strategy roster, cheapest and highest-confidence
/// strategies first, the heaviest ones (headless browser, AI extractor)
/// last. The cascade re-sorts this by observed success rate at dispatch
/// time; registration order only matters as the tiebreak / cold-start
/// order.
fn build_strategy_roster(config: &AppConfig) -> Vec<Arc<dyn FetchStrategy>> {
    let ua = &config.strategies.user_agents;
    let mut roster: Vec<Arc<dyn FetchStrategy>> = vec![
        Arc::new(DirectFetchStrategy::new(ua.default.clone())),
        Arc::new(BypassProxyStrategy::new(
            config.strategies.bypass_proxy_templates.clone(),
            ua.default.clone(),
        )),
        Arc::new(ArchiveMirrorStrategy::new(config.strategies.archive_mirrors.clone(), ua.default.clone())),
        Arc::new(BotSpoofStrategy::new(ua.bot.clone())),
        Arc::new(ReaderModeStrategy::new(ua.reader.clone(), config.strategies.min_word_count)),
        Arc::new(JsDisabledStrategy::new(ua.default.clone())),
        Arc::new(PartialLoadStrategy::new(ua.default.clone())),
        Arc::new(DomScrubStrategy::new(ua.default.clone(), config.strategies.paywall_selectors.clone())),
        Arc::new(WebArchiveLatestStrategy::new(ua.default.clone())),
        Arc::new(WebArchiveMultiTimeframeStrategy::new(ua.default.clone(), archive_timeframes(config))),
    ];

    if !config.strategies.auth_site_credentials.is_empty() {
        roster.push(Arc::new(AuthenticatedStrategy::new(
            config.strategies.auth_site_credentials.clone(),
            session_ttl(config),
            ua.default.clone(),
            config.general.data_dir.clone(),
        )));
    }

    // Headless rendering is heavy and can serialize badly with the async
    // runtime; it always runs last regardless of stats.
    roster.push(Arc::new(HeadlessBrowserStrategy::new(HEADLESS_WAIT_SECS)));

    // AI extractor is opt-in: enabled only once an API key and a nonzero
    // monthly budget are both configured (see DESIGN.md).
    if let Some(api_key) = config.strategies.firecrawl_api_key.clone() {
        if config.strategies.firecrawl_monthly_limit > 0 {
            roster.push(Arc::new(AiExtractorStrategy::new(
                Some(api_key),
                config.strategies.firecrawl_monthly_limit,
                &config.general.data_dir,
            )));
        }
    }

    roster
}

impl AppContext {
    pub async fn build(config: AppConfig) -> Result<Self> {
        let storage = Storage::with_pool_size(
            &config.database.postgres_url,
            config.database.max_connections.unwrap_or(20),
        )
        .await?;
        storage.run_migrations().await?;

        let registry = Arc::new(ResilienceRegistry::new());

        let stats = StrategyStatsTable::load(&config.general.stats_file).await;
        let roster = build_strategy_roster(&config);
        let cascade = Arc::new(Cascade::new(roster, stats));

        let ctx = FetchContext::new(
            Duration::from_secs(config.general.default_timeout_secs),
            10 * 1024 * 1024,
        )?;

        let search_queue = Arc::new(SearchQueue::new(storage.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(config.search.daily_quota, config.search.hourly_cap));
        // Mirrors the "search-ops" entry in ResilienceRegistry::new (quick-ops
        // retry, 5-failure/45s-recovery breaker) as its own owned instance,
        // since the fallback service needs an `Arc` it can hold across its
        // background-processor task and the registry hands out borrows tied
        // to its own lifetime.
        let search_breaker = Arc::new(CircuitBreaker::new(
            "search-ops",
            CircuitBreakerConfig {
                failure_threshold: 5,
                recovery_timeout: Duration::from_secs(45),
                success_threshold: 2,
                timeout: Duration::from_secs(30),
            },
        ));
        let search_retry_policy = registry
            .retry_policy("search-ops")
            .cloned()
            .unwrap_or_else(RetryPolicy::quick_ops);

        let search = SearchFallbackService::new(
            ctx.client.clone(),
            config.search.api_key.clone(),
            config.search.search_engine_id.clone(),
            search_queue,
            rate_limiter,
            search_breaker,
            search_retry_policy,
        );

        let nuclear = Arc::new(NuclearRetryStore::new(
            storage.clone(),
            Arc::clone(&cascade),
            ctx.clone(),
            Arc::clone(&search),
            config.strategies.paywall_phrases.clone(),
            config.strategies.paywall_selectors.clone(),
            config.strategies.min_word_count,
            config.strategies.title_ratio_threshold,
            config.nuclear.max_retry_attempts,
            config.nuclear.human_intervention_threshold,
        ));

        let pipeline = Arc::new(Pipeline {
            storage: storage.clone(),
            cascade,
            ctx,
            search,
            nuclear,
            registry: Arc::clone(&registry),
            paywall_phrases: config.strategies.paywall_phrases.clone(),
            paywall_selectors: config.strategies.paywall_selectors.clone(),
            min_word_count: config.strategies.min_word_count,
            title_ratio_threshold: config.strategies.title_ratio_threshold,
            content_max_chars: config.general.content_max_chars,
        });

        Ok(Self {
            config,
            storage,
            registry,
            pipeline,
        })
    }
}
