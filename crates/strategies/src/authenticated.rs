use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use ingest_core::config::SiteCredential;
use ingest_core::{Capability, FetchResult, PriorityClass, StrategyMetadata};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;
use url::Url;

use crate::http::{get_with_cookie, status_is_success};
use crate::{FetchContext, FetchStrategy};

#[derive(Clone)]
struct Session {
    cookie_header: String,
    logged_in_at: Instant,
}

/// On-disk shape of one site's persisted session, loaded on startup (or on
/// first request to a site this process hasn't seen yet) so a restart
/// doesn't force a fresh login for every site within the TTL window.
#[derive(Serialize, Deserialize)]
struct PersistedSession {
    cookie_header: String,
    logged_in_at: chrono::DateTime<chrono::Utc>,
}

/// Maintains a per-site cookie-backed login session, keyed by host. Sessions
/// expire after `session_ttl`; an expired or missing session triggers a
/// fresh login POST before the target page is fetched. A jittered 3-17s
/// delay is applied before every request to stay under per-site rate
/// limits, enforced on the same per-site critical section that guards
/// login so two concurrent requests to one site can't both skip it.
pub struct AuthenticatedStrategy {
    metadata: StrategyMetadata,
    credentials: HashMap<String, SiteCredential>,
    session_ttl: Duration,
    sessions: DashMap<String, Session>,
    site_locks: DashMap<String, Arc<AsyncMutex<()>>>,
    user_agent: String,
    data_dir: PathBuf,
}

impl AuthenticatedStrategy {
    pub fn new(credentials: HashMap<String, SiteCredential>, session_ttl: Duration, user_agent: String, data_dir: impl Into<PathBuf>) -> Self {
        let supported_domain_suffixes = credentials.keys().cloned().collect();
        Self {
            metadata: StrategyMetadata {
                name: "authenticated".into(),
                priority_class: PriorityClass::High,
                capabilities: vec![Capability::Auth],
                base_success_rate: 0.55,
                avg_response_time_secs: 4.0,
                requires_auth: true,
                has_usage_limits: false,
                remaining_usage: None,
                rate_limit_delay_secs: 10.0,
                supported_domain_suffixes,
            },
            credentials,
            session_ttl,
            sessions: DashMap::new(),
            site_locks: DashMap::new(),
            user_agent,
            data_dir: data_dir.into(),
        }
    }

    fn site_for(&self, host: &str) -> Option<(&str, &SiteCredential)> {
        self.credentials
            .iter()
            .find(|(domain, _)| host.ends_with(domain.as_str()))
            .map(|(domain, cred)| (domain.as_str(), cred))
    }

    /// One mutex per site, shared across every worker task. Holding it spans
    /// the politeness delay and, when needed, the login — the whole critical
    /// section spec.md §5 asks for, not just the cookie read/write.
    fn lock_for(&self, domain: &str) -> Arc<AsyncMutex<()>> {
        self.site_locks.entry(domain.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    fn session_file(&self, domain: &str) -> PathBuf {
        let sanitized: String = domain.chars().map(|c| if c.is_alphanumeric() || c == '.' || c == '-' { c } else { '_' }).collect();
        self.data_dir.join(format!("auth_session_{sanitized}.json"))
    }

    fn session_valid(&self, session: &Session) -> bool {
        session.logged_in_at.elapsed() < self.session_ttl
    }

    /// In-memory session if present, else whatever is on disk (if still
    /// within `session_ttl`), promoted into the in-memory cache.
    async fn load_session(&self, domain: &str) -> Option<Session> {
        if let Some(session) = self.sessions.get(domain).map(|s| s.clone()) {
            if self.session_valid(&session) {
                return Some(session);
            }
        }

        let path = self.session_file(domain);
        let contents = tokio::fs::read_to_string(&path).await.ok()?;
        let persisted: PersistedSession = serde_json::from_str(&contents).ok()?;
        let age = chrono::Utc::now().signed_duration_since(persisted.logged_in_at);
        if age.to_std().ok()? >= self.session_ttl {
            return None;
        }

        let session = Session {
            cookie_header: persisted.cookie_header,
            logged_in_at: Instant::now() - age.to_std().unwrap_or_default(),
        };
        self.sessions.insert(domain.to_string(), session.clone());
        Some(session)
    }

    async fn persist_session(&self, domain: &str, session: &Session) {
        let persisted = PersistedSession {
            cookie_header: session.cookie_header.clone(),
            logged_in_at: chrono::Utc::now(),
        };
        let path = self.session_file(domain);
        if let Some(parent) = path.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                warn!(domain, error = %err, "failed to create data dir for session persistence");
                return;
            }
        }
        match serde_json::to_string(&persisted) {
            Ok(body) => {
                if let Err(err) = tokio::fs::write(&path, body).await {
                    warn!(domain, error = %err, "failed to persist authenticated session");
                }
            }
            Err(err) => warn!(domain, error = %err, "failed to serialize authenticated session"),
        }
    }

    async fn login(&self, ctx: &FetchContext, domain: &str, cred: &SiteCredential) -> Result<Session, String> {
        let login_url = Url::parse(&format!("https://{domain}/login")).map_err(|e| e.to_string())?;
        let mut form = HashMap::new();
        form.insert("username", cred.username.as_str());
        form.insert("password", cred.password.as_str());

        let resp = ctx
            .client
            .post(login_url)
            .header("User-Agent", &self.user_agent)
            .form(&form)
            .timeout(ctx.default_timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() && !resp.status().is_redirection() {
            return Err(format!("login rejected: status {}", resp.status()));
        }

        let cookie_header = resp
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).to_string())
            .collect::<Vec<_>>()
            .join("; ");

        let session = Session {
            cookie_header,
            logged_in_at: Instant::now(),
        };
        self.sessions.insert(domain.to_string(), session.clone());
        self.persist_session(domain, &session).await;
        Ok(session)
    }
}

#[async_trait]
impl FetchStrategy for AuthenticatedStrategy {
    fn metadata(&self) -> &StrategyMetadata {
        &self.metadata
    }

    fn can_handle(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| self.site_for(host).is_some())
    }

    async fn fetch(&self, url: &Url, ctx: &FetchContext) -> FetchResult {
        let start = Instant::now();
        let Some(host) = url.host_str() else {
            return FetchResult::failure(url.as_str(), &self.metadata.name, "url has no host", start.elapsed());
        };
        let Some((domain, cred)) = self.site_for(host) else {
            return FetchResult::failure(url.as_str(), &self.metadata.name, "no credentials configured for host", start.elapsed());
        };
        let domain = domain.to_string();

        // Everything from here — the politeness delay, the session
        // check-or-login, and the fetch itself — runs under one per-site
        // lock so two concurrent requests to the same host can't both
        // decide the session is missing and race each other into login.
        let site_lock = self.lock_for(&domain);
        let _guard = site_lock.lock().await;

        let delay_ms = rand::thread_rng().gen_range(3000..=17_000);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        let session = match self.load_session(&domain).await {
            Some(session) => session,
            None => match self.login(ctx, &domain, cred).await {
                Ok(session) => session,
                Err(err) => return FetchResult::failure(url.as_str(), &self.metadata.name, err, crate::elapsed_since(start)),
            },
        };

        match get_with_cookie(&ctx.client, url, &self.user_agent, Some(&session.cookie_header), ctx.default_timeout, ctx.max_body_size).await {
            Ok(resp) if status_is_success(resp.status) => {
                let article = ingest_extract::extract_article(&resp.body, &resp.final_url);
                let mut metadata = HashMap::new();
                metadata.insert("authenticated_domain".to_string(), serde_json::json!(domain));
                metadata.insert("raw_html".to_string(), serde_json::json!(String::from_utf8_lossy(&resp.body)));
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
            Ok(resp) if resp.status == 401 || resp.status == 403 => {
                self.sessions.remove(&domain);
                let _ = tokio::fs::remove_file(self.session_file(&domain)).await;
                FetchResult::failure(url.as_str(), &self.metadata.name, format!("session rejected: status {}", resp.status), resp.elapsed)
            }
            Ok(resp) => FetchResult::failure(url.as_str(), &self.metadata.name, format!("status {}", resp.status), resp.elapsed),
            Err(err) => FetchResult::failure(url.as_str(), &self.metadata.name, err.to_string(), crate::elapsed_since(start)),
        }
    }
}
