use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub database: DatabaseConfig,
    pub strategies: StrategyConfig,
    pub search: SearchConfig,
    pub nuclear: NuclearConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    pub data_dir: String,
    pub stats_file: String,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_timeout")]
    pub default_timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default)]
    pub preferred_strategies: Vec<String>,
    /// Extracted content is clipped to this many characters before being
    /// written to the content store.
    #[serde(default = "default_content_max_chars")]
    pub content_max_chars: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub postgres_url: String,
    #[serde(default)]
    pub max_connections: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    #[serde(default = "default_firecrawl_limit")]
    pub firecrawl_monthly_limit: u64,
    #[serde(default)]
    pub firecrawl_api_key: Option<String>,
    #[serde(default)]
    pub auth_site_credentials: HashMap<String, SiteCredential>,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: u64,
    #[serde(default = "default_paywall_phrases")]
    pub paywall_phrases: Vec<String>,
    #[serde(default = "default_paywall_selectors")]
    pub paywall_selectors: Vec<String>,
    #[serde(default = "default_min_word_count")]
    pub min_word_count: usize,
    #[serde(default = "default_title_ratio")]
    pub title_ratio_threshold: f64,
    #[serde(default)]
    pub user_agents: UserAgentConfig,
    #[serde(default)]
    pub bypass_proxy_templates: Vec<String>,
    #[serde(default)]
    pub archive_mirrors: Vec<String>,
    #[serde(default)]
    pub archive_timeframes: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteCredential {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UserAgentConfig {
    #[serde(default = "default_ua")]
    pub default: String,
    #[serde(default = "default_bot_ua")]
    pub bot: String,
    #[serde(default = "default_reader_ua")]
    pub reader: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            default: default_ua(),
            bot: default_bot_ua(),
            reader: default_reader_ua(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub search_engine_id: Option<String>,
    #[serde(default = "default_daily_quota")]
    pub daily_quota: u64,
    #[serde(default = "default_hourly_cap")]
    pub hourly_cap: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NuclearConfig {
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_human_intervention_threshold")]
    pub human_intervention_threshold: u32,
}

fn default_max_concurrent() -> usize {
    5
}
fn default_timeout() -> u64 {
    30
}
fn default_retry_attempts() -> u32 {
    2
}
fn default_content_max_chars() -> usize {
    50_000
}
fn default_firecrawl_limit() -> u64 {
    500
}
fn default_session_ttl() -> u64 {
    6
}
fn default_min_word_count() -> usize {
    150
}
fn default_title_ratio() -> f64 {
    0.1
}
fn default_daily_quota() -> u64 {
    8000
}
fn default_hourly_cap() -> u64 {
    333
}
fn default_max_retry_attempts() -> u32 {
    100
}
fn default_human_intervention_threshold() -> u32 {
    30
}
fn default_ua() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string()
}
fn default_bot_ua() -> String {
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)".to_string()
}
fn default_reader_ua() -> String {
    "Mozilla/5.0 (compatible; ReaderBot/1.0)".to_string()
}

fn default_paywall_phrases() -> Vec<String> {
    [
        "subscribe to continue",
        "create a free account",
        "sign in to read",
        "unlock this story",
        "your free articles",
        "to continue reading",
        "subscribe now",
        "subscription required",
        "premium content",
        "members only",
        "register to continue",
        "paid subscribers only",
        "subscribe for full access",
        "subscribe for unlimited access",
        "login to read more",
        "create an account to continue",
        "please enable js",
        "please enable javascript",
        "disable any ad blocker",
        "javascript is disabled",
        "javascript required",
        "enable javascript",
        "this site requires javascript",
        "javascript must be enabled",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_paywall_selectors() -> Vec<String> {
    [
        ".paywall",
        ".subscription-required",
        ".premium-content",
        ".register-wall",
        ".subscription-wall",
        ".paid-content",
        "#paywall",
        "#subscribe-overlay",
        "#subscription-overlay",
        "div[data-paywall]",
        "[data-require-auth]",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
