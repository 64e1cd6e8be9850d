pub mod html;

use sha2::{Digest, Sha256};
use url::Url;

/// Max bytes to parse (5 MB). Larger pages are truncated before parsing.
const MAX_PARSE_SIZE: usize = 5 * 1024 * 1024;

/// Everything a fetch strategy needs out of a raw HTML body to hand off to
/// the Content Analyzer and, on success, the content store.
#[derive(Debug, Clone)]
pub struct Article {
    pub title: String,
    pub body_text: String,
    pub main_text: String,
    pub word_count: usize,
    pub links: Vec<String>,
    pub meta_description: Option<String>,
    pub language: Option<String>,
    pub content_hash: String,
}

pub fn extract_article(body: &[u8], base_url: &Url) -> Article {
    let clipped = if body.len() > MAX_PARSE_SIZE {
        &body[..MAX_PARSE_SIZE]
    } else {
        body
    };
    let html_str = String::from_utf8_lossy(clipped);

    let result = html::parse_html(&html_str, base_url);
    let title = html::extract_title(&html_str);
    let main_text = html::extract_main_text(&html_str);
    let word_count = main_text.split_whitespace().count();

    let mut hasher = Sha256::new();
    hasher.update(body);
    let content_hash = format!("{:x}", hasher.finalize());

    Article {
        title,
        body_text: result.body_text,
        main_text,
        word_count,
        links: result.links,
        meta_description: result.meta_description,
        language: result.language,
        content_hash,
    }
}
