use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Canonical dedup key derived from a URL: lowercased, tracking params stripped,
/// fragment and trailing slash removed.
///
/// `fingerprint(fingerprint(u)) == fingerprint(u)` for any input — normalization
/// is idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UrlFingerprint(String);

impl UrlFingerprint {
    /// `utm_` is the one documented wildcard prefix; everything else here is
    /// an exact parameter name, not a prefix — `referrer`, `refresh_token`,
    /// and `gclid_src` are legitimate distinct params and must survive.
    const TRACKING_PREFIXES: &'static [&'static str] = &["utm_"];
    const TRACKING_PARAMS: &'static [&'static str] = &["fbclid", "gclid", "_ga", "ref"];

    pub fn new(raw: &str) -> Self {
        Self(Self::normalize(raw))
    }

    fn normalize(raw: &str) -> String {
        let trimmed = raw.trim().to_lowercase();
        let without_fragment = trimmed.split('#').next().unwrap_or("");

        let (base, query) = match without_fragment.split_once('?') {
            Some((b, q)) => (b, Some(q)),
            None => (without_fragment, None),
        };
        let base = base.trim_end_matches('/');

        let kept: Vec<&str> = query
            .map(|q| {
                q.split('&')
                    .filter(|pair| {
                        let key = pair.split('=').next().unwrap_or("");
                        let is_tracking = Self::TRACKING_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
                            || Self::TRACKING_PARAMS.iter().any(|param| key == *param);
                        !is_tracking
                    })
                    .collect()
            })
            .unwrap_or_default();

        if kept.is_empty() {
            base.to_string()
        } else {
            format!("{base}?{}", kept.join("&"))
        }
    }
}

impl std::fmt::Display for UrlFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for UrlFingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One unit of work in the persisted job queue. At most one worker holds a
/// running job at a time; status transitions are monotonic except
/// `Running -> Pending` on worker-crash recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlJob {
    pub id: String,
    pub url: String,
    pub source: String,
    pub priority: i32,
    pub status: JobStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub assigned_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub assigned_worker: Option<String>,
    pub retry_count: u32,
    pub result: Option<serde_json::Value>,
}

impl UrlJob {
    pub fn fingerprint(&self) -> UrlFingerprint {
        UrlFingerprint::new(&self.url)
    }
}

/// Outcome of a single strategy's attempt to fetch a URL.
///
/// `success ⇒ content non-empty`. `strategy` and `method` are two names for
/// the same value and MUST stay equal — both accessors read the one field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub success: bool,
    pub url: String,
    pub content: String,
    pub title: Option<String>,
    pub strategy: String,
    pub is_truncated: bool,
    pub metadata: HashMap<String, serde_json::Value>,
    pub processing_time: Duration,
    pub error: Option<String>,
}

impl FetchResult {
    /// Alias for `strategy` — kept distinct in name only, per the data-model
    /// invariant that the two fields must never diverge.
    pub fn method(&self) -> &str {
        &self.strategy
    }

    pub fn failure(url: &str, strategy: &str, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            success: false,
            url: url.to_string(),
            content: String::new(),
            title: None,
            strategy: strategy.to_string(),
            is_truncated: false,
            metadata: HashMap::new(),
            processing_time: elapsed,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriorityClass {
    Highest,
    High,
    Medium,
    Low,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    BasicFetch,
    PaywallBypass,
    Auth,
    JsRender,
    Archive,
    AiExtract,
    RateLimited,
}

/// Static description of a strategy, independent of its runtime stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyMetadata {
    pub name: String,
    pub priority_class: PriorityClass,
    pub capabilities: Vec<Capability>,
    pub base_success_rate: f64,
    pub avg_response_time_secs: f64,
    pub requires_auth: bool,
    pub has_usage_limits: bool,
    pub remaining_usage: Option<u64>,
    pub rate_limit_delay_secs: f64,
    pub supported_domain_suffixes: Vec<String>,
}

impl StrategyMetadata {
    pub fn can_handle(&self, host: &str) -> bool {
        if self.supported_domain_suffixes.is_empty() {
            return true;
        }
        self.supported_domain_suffixes
            .iter()
            .any(|suffix| host.ends_with(suffix.as_str()))
    }
}

/// Persisted extracted-content row. URL fingerprint is the dedup key; a
/// fingerprint maps to at most one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    pub url: String,
    pub title: Option<String>,
    pub content: String,
    pub content_type: String,
    pub metadata: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

pub mod normalize {
    use super::UrlFingerprint;

    /// Normalize a raw submitted URL the way `submit`/`submit_bulk` do before
    /// insert: lowercase, trim whitespace, strip tracking params.
    pub fn submitted_url(raw: &str) -> String {
        UrlFingerprint::new(raw).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_idempotent() {
        let once = UrlFingerprint::new("HTTPS://Example.com/a/?utm_source=x");
        let twice = UrlFingerprint::new(once.as_ref());
        assert_eq!(once, twice);
    }

    #[test]
    fn fingerprint_strips_tracking_params() {
        let bare = UrlFingerprint::new("https://example.com/a");
        let tracked = UrlFingerprint::new("https://example.com/a?utm_source=x");
        assert_eq!(bare, tracked);
    }

    #[test]
    fn fingerprint_only_strips_exact_tracking_param_names() {
        let bare = UrlFingerprint::new("https://example.com/a");
        for decoy in ["referrer=x", "refresh_token=x", "gclid_src=x"] {
            let with_decoy = UrlFingerprint::new(&format!("https://example.com/a?{decoy}"));
            assert_ne!(bare, with_decoy, "{decoy} looks like a tracking param but isn't one");
        }
    }

    #[test]
    fn fetch_result_method_mirrors_strategy() {
        let result = FetchResult::failure("https://x", "direct", "boom", Duration::from_millis(1));
        assert_eq!(result.method(), result.strategy);
    }
}
