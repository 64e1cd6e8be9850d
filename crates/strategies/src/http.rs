use std::collections::HashMap;
use std::time::{Duration, Instant};

use ingest_core::IngestError;
use url::Url;

pub struct RawResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub final_url: Url,
    pub elapsed: Duration,
}

/// Shared GET helper used by every HTTP-based strategy. Enforces the byte
/// cap client-side (reqwest streams the body) and never panics — network and
/// decode failures surface as `IngestError::Network`.
pub async fn get(
    client: &reqwest::Client,
    url: &Url,
    user_agent: &str,
    timeout: Duration,
    max_body_size: usize,
) -> Result<RawResponse, IngestError> {
    get_with_cookie(client, url, user_agent, None, timeout, max_body_size).await
}

/// Same as [`get`], but attaches an explicit `Cookie` header instead of
/// relying on the client's own jar — used by the authenticated strategy,
/// which manages one persisted session per site independently of whatever
/// cookies the shared client may otherwise be holding.
pub async fn get_with_cookie(
    client: &reqwest::Client,
    url: &Url,
    user_agent: &str,
    cookie_header: Option<&str>,
    timeout: Duration,
    max_body_size: usize,
) -> Result<RawResponse, IngestError> {
    let start = Instant::now();
    let mut request = client
        .get(url.clone())
        .header(reqwest::header::USER_AGENT, user_agent)
        .timeout(timeout);
    if let Some(cookie) = cookie_header {
        request = request.header(reqwest::header::COOKIE, cookie);
    }
    let response = request
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                IngestError::Timeout(timeout.as_secs())
            } else {
                IngestError::Network(e.to_string())
            }
        })?;

    let status = response.status().as_u16();
    let final_url = response.url().clone();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
        .collect();

    let body_bytes = response
        .bytes()
        .await
        .map_err(|e| IngestError::Network(e.to_string()))?;

    let body = if body_bytes.len() > max_body_size {
        body_bytes[..max_body_size].to_vec()
    } else {
        body_bytes.to_vec()
    };

    Ok(RawResponse {
        status,
        headers,
        body,
        final_url,
        elapsed: start.elapsed(),
    })
}

pub fn status_is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
