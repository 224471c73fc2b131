//! Full-text content extractor.
//!
//! Given an article's permalink, recover the body text through an ordered
//! fallback chain: the source's own content selector, then a list of
//! generic selectors keeping the longest acceptable result, then a
//! concatenation of substantial paragraphs. Extraction failure is an
//! `Option::None`, never an error — losing a body must not stop the
//! owning job.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

use crate::text::clean_text;

/// A body below this many characters is treated as extraction noise.
const MIN_BODY_CHARS: usize = 200;
/// Paragraphs shorter than this are ignored by the last-resort pass.
const MIN_PARAGRAPH_CHARS: usize = 50;

/// Generic selectors tried when the source has no usable hint, in order.
const GENERIC_SELECTORS: &[&str] = &[
    ".article-content",
    ".entry-content",
    ".post-content",
    ".content",
    "article",
    ".article-body",
];

/// Tags removed wholesale before text extraction.
static STRIP_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["script", "style", "nav", "header", "footer", "aside"]
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}[^>]*>.*?</{tag}>")).unwrap())
        .collect()
});

fn strip_noncontent(html: &str) -> String {
    let mut stripped = html.to_string();
    for re in STRIP_RES.iter() {
        stripped = re.replace_all(&stripped, "").into_owned();
    }
    stripped
}

/// Fetch `url` and recover its body text. `hint` is the source-specific
/// content selector, tried before the generic chain.
#[instrument(level = "debug", skip_all, fields(%url))]
pub async fn fetch_full_text(
    client: &reqwest::Client,
    url: &str,
    hint: Option<&str>,
) -> Option<String> {
    let resp = match client.get(url).send().await {
        Ok(resp) => resp,
        Err(e) => {
            debug!(%url, error = %e, "Content fetch failed");
            return None;
        }
    };
    if !resp.status().is_success() {
        debug!(%url, status = %resp.status(), "Content fetch returned non-success status");
        return None;
    }
    let body = resp.text().await.ok()?;
    extract_body(&body, hint)
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let element = document.select(&sel).next()?;
    Some(clean_text(&element.text().collect::<Vec<_>>().join(" ")))
}

/// Pure extraction half of [`fetch_full_text`].
fn extract_body(html: &str, hint: Option<&str>) -> Option<String> {
    let document = Html::parse_document(&strip_noncontent(html));

    if let Some(hint) = hint {
        if let Some(text) = select_text(&document, hint) {
            if text.chars().count() > MIN_BODY_CHARS {
                return Some(text);
            }
        }
    }

    // Generic chain: keep the LONGEST acceptable result, not the first —
    // completeness beats speed here.
    let best = GENERIC_SELECTORS
        .iter()
        .filter_map(|selector| select_text(&document, selector))
        .filter(|text| text.chars().count() > MIN_BODY_CHARS)
        .max_by_key(|text| text.chars().count());
    if best.is_some() {
        return best;
    }

    // Last resort: stitch together every substantial paragraph.
    let p_sel = Selector::parse("p").ok()?;
    let joined = document
        .select(&p_sel)
        .map(|el| clean_text(&el.text().collect::<Vec<_>>().join(" ")))
        .filter(|text| text.chars().count() > MIN_PARAGRAPH_CHARS)
        .collect::<Vec<_>>()
        .join(" ");
    (joined.chars().count() > MIN_BODY_CHARS).then_some(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn para(len: usize) -> String {
        "字".repeat(len)
    }

    #[test]
    fn test_hint_selector_wins_when_long_enough() {
        let html = format!(
            r#"<html><body>
              <div class="custom">{}</div>
              <div class="entry-content">{}</div>
            </body></html>"#,
            para(250),
            para(400)
        );
        let body = extract_body(&html, Some(".custom")).unwrap();
        assert_eq!(body.chars().count(), 250);
    }

    #[test]
    fn test_short_hint_falls_through_to_generic() {
        let html = format!(
            r#"<html><body>
              <div class="custom">{}</div>
              <div class="entry-content">{}</div>
            </body></html>"#,
            para(50),
            para(400)
        );
        let body = extract_body(&html, Some(".custom")).unwrap();
        assert_eq!(body.chars().count(), 400);
    }

    #[test]
    fn test_generic_chain_keeps_longest_result() {
        let html = format!(
            r#"<html><body>
              <div class="article-content">{}</div>
              <div class="post-content">{}</div>
            </body></html>"#,
            para(220),
            para(500)
        );
        // .article-content comes first in the chain but .post-content is
        // longer.
        let body = extract_body(&html, None).unwrap();
        assert_eq!(body.chars().count(), 500);
    }

    #[test]
    fn test_paragraph_fallback_skips_short_paragraphs() {
        let html = format!(
            r#"<html><body>
              <p>{}</p>
              <p>short</p>
              <p>{}</p>
            </body></html>"#,
            para(150),
            para(150)
        );
        let body = extract_body(&html, None).unwrap();
        assert!(!body.contains("short"));
        // Two paragraphs of 150 joined by a space.
        assert_eq!(body.chars().count(), 301);
    }

    #[test]
    fn test_everything_short_yields_none() {
        let html = "<html><body><p>只有一句话。</p></body></html>";
        assert!(extract_body(html, None).is_none());
    }

    #[test]
    fn test_script_and_nav_are_stripped() {
        let html = format!(
            r#"<html><body>
              <nav>首页 分类 关于</nav>
              <article><script>var x = "{}";</script>{}</article>
            </body></html>"#,
            para(300),
            para(260)
        );
        let body = extract_body(&html, None).unwrap();
        assert_eq!(body.chars().count(), 260);
        assert!(!body.contains("首页"));
    }
}
