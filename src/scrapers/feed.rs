//! Structured-feed adapter (RSS/Atom).

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::config::FeedSource;
use crate::dedup::LookbackIndex;
use crate::models::Candidate;
use crate::text::{categorize, clean_text, is_relevant, normalize_url};

/// Fetch a feed document and turn its entries into candidates.
///
/// A transport failure propagates (the job records it against this
/// source); a document that fetched fine but does not parse as a feed is
/// logged and yields an empty list — one bad feed must not abort the run.
#[instrument(level = "info", skip_all, fields(source = %source.name))]
pub async fn fetch(
    client: &reqwest::Client,
    source: &FeedSource,
    lookback: &LookbackIndex,
    min_title_len: usize,
) -> Result<Vec<Candidate>> {
    let resp = client.get(&source.url).send().await?.error_for_status()?;
    let bytes = resp.bytes().await?;

    let parsed = match feed_rs::parser::parse(&bytes[..]) {
        Ok(feed) => feed,
        Err(e) => {
            warn!(source = %source.name, error = %e, "Malformed feed document; skipping source");
            return Ok(Vec::new());
        }
    };

    let candidates = candidates_from_feed(parsed, source, lookback, min_title_len);
    info!(source = %source.name, count = candidates.len(), "Indexed feed candidates");
    Ok(candidates)
}

fn candidates_from_feed(
    feed: feed_rs::model::Feed,
    source: &FeedSource,
    lookback: &LookbackIndex,
    min_title_len: usize,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for entry in feed.entries {
        let Some(title) = entry.title.as_ref().map(|t| clean_text(&t.content)) else {
            continue;
        };
        let Some(link) = entry
            .links
            .first()
            .map(|l| l.href.clone())
            .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))
        else {
            continue;
        };

        if title.is_empty() {
            continue;
        }
        if !is_relevant(&title, min_title_len) {
            debug!(source = %source.name, %title, "Entry not relevant; dropped");
            continue;
        }
        if lookback.seen_title(&title) {
            debug!(source = %source.name, %title, "Entry already seen; dropped");
            continue;
        }

        let url = normalize_url(&link, Some(&source.url));
        let summary = entry
            .summary
            .as_ref()
            .map(|s| clean_text(&s.content))
            .unwrap_or_default();
        let published_at = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| {
                warn!(source = %source.name, %title, "Feed entry has no publish date; using now");
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
            tags: vec![source.name.clone(), "RSS".to_string()],
        });
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TitleMatch;

    const FEED_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>EETimes</title>
    <link>https://www.eetimes.com/</link>
    <item>
      <title>新一代半导体工艺进入量产</title>
      <link>/2024/01/process-node</link>
      <description>&lt;p&gt;晶圆厂 产能爬坡&lt;/p&gt;</description>
      <pubDate>Fri, 05 Jan 2024 08:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Local bakery opens downtown</title>
      <link>https://www.eetimes.com/bakery</link>
    </item>
    <item>
      <title>重复的半导体新闻标题</title>
      <link>https://www.eetimes.com/dup</link>
    </item>
  </channel>
</rss>"#;

    fn source() -> FeedSource {
        FeedSource {
            name: "EETimes".to_string(),
            url: "https://www.eetimes.com/feed/".to_string(),
            content_selector: None,
        }
    }

    #[test]
    fn test_feed_entries_become_candidates() {
        let feed = feed_rs::parser::parse(FEED_XML.as_bytes()).unwrap();
        let lookback = LookbackIndex::empty(TitleMatch::Exact);
        let candidates = candidates_from_feed(feed, &source(), &lookback, 2);

        assert_eq!(candidates.len(), 2);
        let first = &candidates[0];
        assert_eq!(first.title, "新一代半导体工艺进入量产");
        // Relative link resolved against the feed URL, markup stripped.
        assert_eq!(first.url, "https://www.eetimes.com/2024/01/process-node");
        assert_eq!(first.summary, "晶圆厂 产能爬坡");
        assert_eq!(first.category, "制造工艺");
        assert_eq!(first.tags, vec!["EETimes".to_string(), "RSS".to_string()]);
    }

    #[test]
    fn test_irrelevant_entries_dropped() {
        let feed = feed_rs::parser::parse(FEED_XML.as_bytes()).unwrap();
        let lookback = LookbackIndex::empty(TitleMatch::Exact);
        let candidates = candidates_from_feed(feed, &source(), &lookback, 2);
        assert!(candidates.iter().all(|c| c.title != "Local bakery opens downtown"));
    }

    #[test]
    fn test_lookback_titles_dropped() {
        let feed = feed_rs::parser::parse(FEED_XML.as_bytes()).unwrap();
        let mut lookback = LookbackIndex::empty(TitleMatch::Exact);
        lookback.remember("重复的半导体新闻标题", "https://elsewhere.com/x");
        let candidates = candidates_from_feed(feed, &source(), &lookback, 2);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_malformed_document_is_not_a_feed() {
        assert!(feed_rs::parser::parse(&b"<html><body>not a feed</body></html>"[..]).is_err());
    }
}
