use std::collections::HashMap;

use scraper::{Html, Selector};
use url::Url;

pub struct HtmlResult {
    pub title: Option<String>,
    pub h1: Vec<String>,
    pub body_text: String,
    pub links: Vec<String>,
    pub meta_description: Option<String>,
    pub language: Option<String>,
    pub open_graph: HashMap<String, String>,
}

pub fn parse_html(html_str: &str, base_url: &Url) -> HtmlResult {
    let document = Html::parse_document(html_str);

    let title = selector("title")
        .and_then(|s| document.select(&s).next())
        .map(|el| el.text().collect::<String>().trim().to_string());

    let h1 = extract_text_by_selector(&document, "h1");

    let body_text = selector("body")
        .and_then(|s| document.select(&s).next())
        .map(|el| {
            el.text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    let links = extract_links(&document, base_url);

    let meta_description = extract_meta_content(&document, "description");

    let language = selector("html")
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("lang").map(|s| s.to_string()));

    let mut open_graph = HashMap::new();
    if let Some(sel) = selector("meta[property^='og:']") {
        for el in document.select(&sel) {
            if let (Some(prop), Some(content)) =
                (el.value().attr("property"), el.value().attr("content"))
            {
                open_graph.insert(prop.to_string(), content.to_string());
            }
        }
    }

    HtmlResult {
        title,
        h1,
        body_text,
        links,
        meta_description,
        language,
        open_graph,
    }
}

/// Title extraction per the analyzer's policy: prefer `<title>`, then first
/// `<h1>`, else literal "Untitled". Never panics on unparseable input.
pub fn extract_title(html_str: &str) -> String {
    let document = Html::parse_document(html_str);
    if let Some(title) = selector("title")
        .and_then(|s| document.select(&s).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
    {
        return title;
    }
    if let Some(h1) = extract_text_by_selector(&document, "h1").into_iter().next() {
        return h1;
    }
    "Untitled".to_string()
}

/// Readability-style main-body extraction: concatenated text of `<article>`,
/// falling back to `<main>`, falling back to `<body>`.
pub fn extract_main_text(html_str: &str) -> String {
    let document = Html::parse_document(html_str);
    for candidate in ["article", "main", "body"] {
        if let Some(sel) = selector(candidate) {
            if let Some(el) = document.select(&sel).next() {
                let text = el
                    .text()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ");
                if !text.is_empty() {
                    return text;
                }
            }
        }
    }
    String::new()
}

/// Remove `<script>` elements whose body mentions any of the given keywords
/// (used by the JS-disabled and DOM-scrub strategies).
pub fn strip_scripts_matching(html_str: &str, keywords: &[&str]) -> String {
    let document = Html::parse_document(html_str);
    let Some(sel) = selector("script") else {
        return html_str.to_string();
    };
    let mut out = html_str.to_string();
    for el in document.select(&sel) {
        let body = el.text().collect::<String>();
        let body_lower = body.to_lowercase();
        if keywords.iter().any(|k| body_lower.contains(k)) && !body.is_empty() {
            out = out.replace(&body, "");
        }
    }
    out
}

/// Remove `<style>` blocks whose text mentions any of the given keywords
/// (paywall/blur/hidden rules used to visually mask gated content).
pub fn strip_styles_matching(html_str: &str, keywords: &[&str]) -> String {
    let document = Html::parse_document(html_str);
    let Some(sel) = selector("style") else {
        return html_str.to_string();
    };
    let mut out = html_str.to_string();
    for el in document.select(&sel) {
        let body = el.text().collect::<String>();
        let body_lower = body.to_lowercase();
        if keywords.iter().any(|k| body_lower.contains(k)) && !body.is_empty() {
            out = out.replace(&body, "");
        }
    }
    out
}

/// Remove elements matching any of the given CSS selectors (paywall DOM scrub).
pub fn strip_elements_matching(html_str: &str, selectors: &[String]) -> String {
    let document = Html::parse_document(html_str);
    let mut removed_fragments = Vec::new();
    for sel_str in selectors {
        if let Some(sel) = selector(sel_str) {
            for el in document.select(&sel) {
                removed_fragments.push(el.html());
            }
        }
    }
    let mut out = html_str.to_string();
    for fragment in removed_fragments {
        out = out.replace(&fragment, "");
    }
    out
}

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

fn extract_text_by_selector(document: &Html, sel: &str) -> Vec<String> {
    selector(sel)
        .map(|s| {
            document
                .select(&s)
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let Some(sel) = selector("a[href]") else {
        return vec![];
    };

    document
        .select(&sel)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            if href.starts_with("javascript:")
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
                || href.starts_with("data:")
                || href.starts_with('#')
            {
                return None;
            }
            let resolved = base_url.join(href).ok()?;
            if resolved.scheme() != "http" && resolved.scheme() != "https" {
                return None;
            }
            Some(resolved.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_prefers_title_tag() {
        let html = "<html><head><title>Hello</title></head><body><h1>World</h1></body></html>";
        assert_eq!(extract_title(html), "Hello");
    }

    #[test]
    fn title_falls_back_to_h1() {
        let html = "<html><head></head><body><h1>World</h1></body></html>";
        assert_eq!(extract_title(html), "World");
    }

    #[test]
    fn title_falls_back_to_untitled() {
        let html = "<html><body><p>no headings here</p></body></html>";
        assert_eq!(extract_title(html), "Untitled");
    }

    #[test]
    fn strips_scripts_mentioning_paywall() {
        let html = "<html><body><script>var paywall = true;</script><p>ok</p></body></html>";
        let stripped = strip_scripts_matching(html, &["paywall"]);
        assert!(!stripped.contains("var paywall"));
    }
}
