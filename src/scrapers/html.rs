//! HTML-selector adapter for sources without a usable feed.
//!
//! Each source configures CSS selectors for the listing container and the
//! fields inside it. An element missing its title or link is skipped on
//! its own; the rest of the page still yields candidates.

use anyhow::Result;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};

use crate::config::HtmlSource;
use crate::dedup::LookbackIndex;
use crate::models::Candidate;
use crate::text::{categorize, clean_text, is_relevant, normalize_url, parse_date};

/// Fetch a listing page and enumerate candidates with the source's
/// selectors.
#[instrument(level = "info", skip_all, fields(source = %source.name))]
pub async fn fetch(
    client: &reqwest::Client,
    source: &HtmlSource,
    lookback: &LookbackIndex,
    min_title_len: usize,
) -> Result<Vec<Candidate>> {
    let body = client
        .get(&source.url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let candidates = parse_listing(&body, source, lookback, min_title_len);
    info!(source = %source.name, count = candidates.len(), "Indexed listing candidates");
    Ok(candidates)
}

fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

fn parse_listing(
    body: &str,
    source: &HtmlSource,
    lookback: &LookbackIndex,
    min_title_len: usize,
) -> Vec<Candidate> {
    let selectors = &source.selectors;
    let (Ok(list_sel), Ok(title_sel), Ok(link_sel)) = (
        Selector::parse(&selectors.list),
        Selector::parse(&selectors.title),
        Selector::parse(&selectors.link),
    ) else {
        warn!(source = %source.name, "Invalid listing selectors; skipping source");
        return Vec::new();
    };
    let summary_sel = selectors
        .summary
        .as_deref()
        .and_then(|s| Selector::parse(s).ok());
    let date_sel = selectors
        .date
        .as_deref()
        .and_then(|s| Selector::parse(s).ok());

    let document = Html::parse_document(body);
    let mut candidates = Vec::new();

    for element in document.select(&list_sel) {
        let Some(title_el) = element.select(&title_sel).next() else {
            continue;
        };
        let Some(href) = element
            .select(&link_sel)
            .next()
            .and_then(|link| link.value().attr("href"))
        else {
            continue;
        };

        let title = element_text(title_el);
        if title.is_empty() {
            continue;
        }
        if !is_relevant(&title, min_title_len) {
            debug!(source = %source.name, %title, "Listing entry not relevant; dropped");
            continue;
        }
        if lookback.seen_title(&title) {
            debug!(source = %source.name, %title, "Listing entry already seen; dropped");
            continue;
        }

        let url = normalize_url(href, Some(&source.url));
        let summary = summary_sel
            .as_ref()
            .and_then(|sel| element.select(sel).next())
            .map(element_text)
            .unwrap_or_default();
        let date_text = date_sel
            .as_ref()
            .and_then(|sel| element.select(sel).next())
            .map(element_text)
            .unwrap_or_default();
        let published_at = parse_date(&date_text).unwrap_or_else(|| {
            warn!(source = %source.name, %title, date = %date_text, "Failed to parse date; using now");
            Utc::now()
        });
        let category = categorize(&title, &summary);

        candidates.push(Candidate {
            title,
            summary,
            url,
            source: source.name.clone(),
            published_at,
            category,
            tags: vec![source.name.clone(), "HTML".to_string()],
        });
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ListSelectors, TitleMatch};
    use chrono::Datelike;

    const LISTING: &str = r#"<html><body>
      <div class="post-item">
        <h2><a href="/news/7nm-update">中芯国际7nm晶圆产能更新</a></h2>
        <p class="excerpt">晶圆 产能数据</p>
        <span class="date">2024年2月1日</span>
      </div>
      <div class="post-item">
        <h2>没有链接的半导体新闻条目</h2>
      </div>
      <div class="post-item">
        <h2><a href="/news/gardening">Ten gardening tips for spring</a></h2>
      </div>
      <div class="post-item">
        <h2><a href="/news/no-date">芯片行业无日期新闻条目</a></h2>
      </div>
    </body></html>"#;

    fn source() -> HtmlSource {
        HtmlSource {
            name: "SemiWiki".to_string(),
            url: "https://www.semiwiki.com/".to_string(),
            selectors: ListSelectors {
                list: ".post-item".to_string(),
                title: "h2".to_string(),
                link: "h2 a".to_string(),
                summary: Some(".excerpt".to_string()),
                date: Some(".date".to_string()),
                content: None,
            },
        }
    }

    #[test]
    fn test_listing_extraction_and_link_resolution() {
        let lookback = LookbackIndex::empty(TitleMatch::Exact);
        let candidates = parse_listing(LISTING, &source(), &lookback, 2);

        assert_eq!(candidates.len(), 2);
        let first = &candidates[0];
        assert_eq!(first.title, "中芯国际7nm晶圆产能更新");
        assert_eq!(first.url, "https://www.semiwiki.com/news/7nm-update");
        assert_eq!(first.summary, "晶圆 产能数据");
        assert_eq!(first.category, "制造工艺");
        assert_eq!(
            (first.published_at.year(), first.published_at.month(), first.published_at.day()),
            (2024, 2, 1)
        );
        assert_eq!(first.tags, vec!["SemiWiki".to_string(), "HTML".to_string()]);
    }

    #[test]
    fn test_element_without_link_skipped_alone() {
        let lookback = LookbackIndex::empty(TitleMatch::Exact);
        let candidates = parse_listing(LISTING, &source(), &lookback, 2);
        assert!(candidates.iter().all(|c| !c.title.contains("没有链接")));
    }

    #[test]
    fn test_irrelevant_title_dropped() {
        let lookback = LookbackIndex::empty(TitleMatch::Exact);
        let candidates = parse_listing(LISTING, &source(), &lookback, 2);
        assert!(candidates.iter().all(|c| !c.title.contains("gardening")));
    }

    #[test]
    fn test_missing_date_falls_back_to_now() {
        let lookback = LookbackIndex::empty(TitleMatch::Exact);
        let candidates = parse_listing(LISTING, &source(), &lookback, 2);
        let undated = candidates
            .iter()
            .find(|c| c.title.contains("无日期"))
            .unwrap();
        assert!(Utc::now().signed_duration_since(undated.published_at).num_minutes() < 1);
    }

    #[test]
    fn test_invalid_selector_yields_empty() {
        let mut bad = source();
        bad.selectors.list = ":::".to_string();
        let lookback = LookbackIndex::empty(TitleMatch::Exact);
        assert!(parse_listing(LISTING, &bad, &lookback, 2).is_empty());
    }

    #[test]
    fn test_seen_title_dropped() {
        let mut lookback = LookbackIndex::empty(TitleMatch::Exact);
        lookback.remember("中芯国际7nm晶圆产能更新", "https://elsewhere.com/x");
        let candidates = parse_listing(LISTING, &source(), &lookback, 2);
        assert_eq!(candidates.len(), 1);
    }
}
