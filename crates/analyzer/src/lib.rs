use once_cell::sync::Lazy;
use scraper::{Html, Selector};

/// Outcome of running the content-quality policy over a fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentVerdict {
    pub is_truncated: bool,
    pub is_likely_paywall: bool,
}

static LOGIN_FORM_KEYWORDS: &[&str] = &["login", "sign in", "subscribe", "register"];

/// Policy config the analyzer evaluates against. Callers build this from
/// `AppConfig::strategies` — kept standalone here so the analyzer stays a
/// pure function crate with no dependency on the config type.
pub struct AnalyzerPolicy<'a> {
    pub paywall_phrases: &'a [String],
    pub paywall_selectors: &'a [String],
    pub min_word_count: usize,
    pub title_ratio_threshold: f64,
}

/// Evaluate the content-quality policy in order; any hit is conclusive.
/// Never panics — unparseable input yields `(not truncated, not paywall)`.
pub fn analyze(html_content: &str, policy: &AnalyzerPolicy, main_text: &str) -> ContentVerdict {
    if html_content.is_empty() {
        return ContentVerdict::default();
    }

    let document = Html::parse_document(html_content);
    let text = document.root_element().text().collect::<String>().to_lowercase();

    // 1. paywall phrases
    for phrase in policy.paywall_phrases {
        if text.contains(phrase.as_str()) {
            return ContentVerdict {
                is_truncated: true,
                is_likely_paywall: true,
            };
        }
    }

    // 2. paywall DOM selectors
    for sel_str in policy.paywall_selectors {
        if let Ok(sel) = Selector::parse(sel_str) {
            if document.select(&sel).next().is_some() {
                return ContentVerdict {
                    is_truncated: true,
                    is_likely_paywall: true,
                };
            }
        }
    }

    // 3. title-to-content ratio
    if let Some(title_len) = title_len(&document) {
        let content_len = text.len();
        if content_len > 0 {
            let ratio = title_len as f64 / content_len as f64;
            if ratio > policy.title_ratio_threshold {
                return ContentVerdict {
                    is_truncated: true,
                    is_likely_paywall: false,
                };
            }
        }
    }

    // 4. login/subscribe keywords in the first three forms
    if let Ok(form_sel) = Selector::parse("form") {
        for form in document.select(&form_sel).take(3) {
            let form_text = form.text().collect::<String>().to_lowercase();
            if LOGIN_FORM_KEYWORDS.iter().any(|w| form_text.contains(w)) {
                return ContentVerdict {
                    is_truncated: true,
                    is_likely_paywall: false,
                };
            }
        }
    }

    // 5. main-body word count, falling back to raw text split
    let word_count = if main_text.is_empty() {
        text.split_whitespace().count()
    } else {
        main_text.split_whitespace().count()
    };
    if word_count < policy.min_word_count {
        return ContentVerdict {
            is_truncated: true,
            is_likely_paywall: false,
        };
    }

    ContentVerdict::default()
}

/// Cheap standalone paywall check used by strategies that only need a quick
/// reject (e.g. bypass-proxy short-response rejection), not the full policy.
pub fn is_likely_paywall(html_content: &str, paywall_phrases: &[String]) -> bool {
    if html_content.is_empty() {
        return false;
    }
    let text = html_content.to_lowercase();
    if paywall_phrases.iter().any(|p| text.contains(p.as_str())) {
        return true;
    }
    text.len() < 10 || text.split_whitespace().count() < 5
}

/// Title extraction per the analyzer's policy: `<title>`, then `<h1>`, else
/// the literal "Untitled".
pub fn extract_title(html_content: &str) -> String {
    ingest_extract::html::extract_title(html_content)
}

fn title_len(document: &Html) -> Option<usize> {
    static TITLE_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
    document
        .select(&TITLE_SEL)
        .next()
        .map(|el| el.text().collect::<String>().trim().len())
        .filter(|len| *len > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AnalyzerPolicy<'static> {
        static PHRASES: Lazy<Vec<String>> =
            Lazy::new(|| vec!["subscribe to continue".to_string()]);
        static SELECTORS: Lazy<Vec<String>> = Lazy::new(|| vec![".paywall".to_string()]);
        AnalyzerPolicy {
            paywall_phrases: &PHRASES,
            paywall_selectors: &SELECTORS,
            min_word_count: 150,
            title_ratio_threshold: 0.1,
        }
    }

    #[test]
    fn detects_paywall_phrase() {
        let html = "<html><body>Subscribe to continue reading this story.</body></html>";
        let verdict = analyze(html, &policy(), "");
        assert!(verdict.is_truncated);
        assert!(verdict.is_likely_paywall);
    }

    #[test]
    fn detects_short_content() {
        let words = "word ".repeat(10);
        let html = format!("<html><body>{words}</body></html>");
        let verdict = analyze(&html, &policy(), &words);
        assert!(verdict.is_truncated);
        assert!(!verdict.is_likely_paywall);
    }

    #[test]
    fn accepts_long_clean_article() {
        let words = "word ".repeat(400);
        let html = format!("<html><head><title>Neutral headline</title></head><body>{words}</body></html>");
        let verdict = analyze(&html, &policy(), &words);
        assert!(!verdict.is_truncated);
        assert!(!verdict.is_likely_paywall);
    }

    #[test]
    fn empty_input_never_panics() {
        let verdict = analyze("", &policy(), "");
        assert_eq!(verdict, ContentVerdict::default());
    }
}
