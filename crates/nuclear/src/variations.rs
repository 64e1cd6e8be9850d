use url::Url;

const MAX_VARIATIONS: usize = 5;

/// Builds alternative search queries for a URL that every fetch strategy
/// has given up on, in the same order the original "try everything"
/// fallback walked them: cleaned title, title scoped to the site, the last
/// path segment turned into words, the last two segments combined, and a
/// generic "article {domain}" catch-all. Capped at five candidates.
pub fn generate(url: &str, title: Option<&str>) -> Vec<String> {
    let mut queries = Vec::new();
    let parsed = Url::parse(url).ok();
    let domain = parsed.as_ref().and_then(|u| u.host_str()).unwrap_or("").trim_start_matches("www.");

    if let Some(title) = title {
        let cleaned = clean_title(title, 80);
        if !cleaned.is_empty() {
            queries.push(cleaned);
        }

        if !domain.is_empty() {
            let scoped = clean_title(title, 60);
            if !scoped.is_empty() {
                queries.push(format!("{scoped} site:{domain}"));
            }
        }
    }

    if let Some(parsed) = &parsed {
        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        if let Some(last) = segments.last() {
            if let Some(words) = segment_to_words(last, 80) {
                queries.push(words);
            }
        }

        if segments.len() >= 2 {
            let combined = format!("{} {}", segments[segments.len() - 2], segments[segments.len() - 1]);
            if let Some(words) = segment_to_words(&combined, 80) {
                queries.push(words);
            }
        }
    }

    if !domain.is_empty() {
        queries.push(format!("article {domain}"));
    }

    queries.truncate(MAX_VARIATIONS);
    queries
}

fn clean_title(title: &str, max_len: usize) -> String {
    let mut cleaned = String::with_capacity(title.len());
    let mut depth = 0i32;
    for ch in title.chars() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = (depth - 1).max(0),
            _ if depth == 0 => cleaned.push(ch),
            _ => {}
        }
    }
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&cleaned, max_len)
}

fn segment_to_words(segment: &str, max_len: usize) -> Option<String> {
    let decoded = percent_decode(segment);
    if decoded.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let words = decoded.replace(['-', '_'], " ");
    let words = words.split_whitespace().collect::<Vec<_>>().join(" ");
    if words.is_empty() {
        None
    } else {
        Some(truncate_chars(&words, max_len))
    }
}

fn percent_decode(s: &str) -> String {
    url::form_urlencoded::parse(format!("v={s}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| s.to_string())
}

fn truncate_chars(s: &str, max_len: usize) -> String {
    s.chars().take(max_len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_at_five_variations() {
        let variations = generate(
            "https://news.example.com/2024/03/first-segment/second-segment",
            Some("Some Headline (Updated) [Premium]"),
        );
        assert!(variations.len() <= MAX_VARIATIONS);
        assert!(!variations.is_empty());
    }

    #[test]
    fn strips_bracketed_text_from_title() {
        let cleaned = clean_title("Big Story (Exclusive) [Paywalled]", 80);
        assert_eq!(cleaned, "Big Story");
    }

    #[test]
    fn numeric_segment_is_skipped() {
        assert_eq!(segment_to_words("12345", 80), None);
    }

    #[test]
    fn word_segment_becomes_spaced_query() {
        assert_eq!(segment_to_words("breaking-news-today", 80), Some("breaking news today".to_string()));
    }

    #[test]
    fn falls_back_to_generic_domain_query_without_title() {
        let variations = generate("https://example.com/", None);
        assert!(variations.iter().any(|q| q == "article example.com"));
    }
}
