use ingest_core::IngestError;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CustomSearchResponse {
    #[serde(default)]
    items: Vec<CustomSearchItem>,
}

#[derive(Debug, Deserialize)]
struct CustomSearchItem {
    link: String,
}

/// One call to the Google Custom Search JSON API, requesting a single
/// result. Returns `Ok(None)` on a clean no-results response; HTTP 429
/// surfaces as `IngestError::RateLimited` so the caller can re-queue and
/// cool down, any other non-2xx as `IngestError::Http`.
pub async fn search_once(
    client: &reqwest::Client,
    api_key: &str,
    search_engine_id: &str,
    query: &str,
) -> Result<Option<String>, IngestError> {
    let response = client
        .get("https://www.googleapis.com/customsearch/v1")
        .query(&[
            ("key", api_key),
            ("cx", search_engine_id),
            ("q", query),
            ("num", "1"),
        ])
        .send()
        .await
        .map_err(|err| IngestError::Network(err.to_string()))?;

    let status = response.status();
    if status.as_u16() == 429 {
        return Err(IngestError::RateLimited("google custom search quota exceeded".into()));
    }
    if !status.is_success() {
        return Err(IngestError::Http {
            status: status.as_u16(),
            message: "google custom search api error".into(),
        });
    }

    let parsed: CustomSearchResponse = response
        .json()
        .await
        .map_err(|err| IngestError::Network(err.to_string()))?;

    Ok(parsed.items.into_iter().next().map(|item| item.link))
}
