//! Deduplication engine.
//!
//! Two modes share the same fingerprints. The pre-insert check runs while
//! scraping: exact title/URL lookups against the store plus a content-hash
//! comparison against an in-memory lookback window. The post-hoc cleanup
//! scans a whole table in creation order and deletes every later record
//! whose key was already produced by an earlier one, which makes a repeat
//! run with no new data delete nothing.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::config::TitleMatch;
use crate::models::{NewsKey, WebsiteRow, WechatRow};
use crate::store::{Store, StoreResult};
use crate::text::content_hash;

fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

fn normalize_site_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}

/// In-memory dedup state for one job run, seeded from the store's trailing
/// window. Passed explicitly into the adapters and back out — nothing
/// survives between unrelated runs.
pub struct LookbackIndex {
    titles: HashSet<String>,
    hashes: HashSet<String>,
    title_match: TitleMatch,
}

impl LookbackIndex {
    /// Seed the index from records created within the last `days` days.
    pub async fn load(store: &Store, days: i64, title_match: TitleMatch) -> StoreResult<Self> {
        let rows = store.recent_news_keys(days).await?;
        let mut index = Self::empty(title_match);
        for row in &rows {
            index.remember(&row.title, &row.original_url);
        }
        info!(rows = rows.len(), days, "Loaded dedup lookback window");
        Ok(index)
    }

    pub fn empty(title_match: TitleMatch) -> Self {
        Self {
            titles: HashSet::new(),
            hashes: HashSet::new(),
            title_match,
        }
    }

    /// Whether a title counts as already seen under the configured
    /// strictness.
    pub fn seen_title(&self, title: &str) -> bool {
        let normalized = normalize_title(title);
        match self.title_match {
            TitleMatch::Exact => self.titles.contains(&normalized),
            TitleMatch::Containment => self
                .titles
                .iter()
                .any(|t| t.contains(&normalized) || normalized.contains(t)),
        }
    }

    pub fn seen_hash(&self, title: &str, url: &str) -> bool {
        self.hashes.contains(&content_hash(title, url))
    }

    /// Record a persisted article so later candidates in the same run see
    /// it.
    pub fn remember(&mut self, title: &str, url: &str) {
        self.titles.insert(normalize_title(title));
        self.hashes.insert(content_hash(title, url));
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

/// Outcome of a pre-insert check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The store already holds this article; the id is returned as
    /// "already have it", not as an error.
    Existing(String),
    /// Content hash matched within the lookback window without an exact
    /// title/URL hit — looks identical, skip silently.
    SkipSimilar,
    /// Genuinely new.
    Fresh,
}

/// Pre-insert check for an article candidate.
pub async fn check_article(
    store: &Store,
    lookback: &LookbackIndex,
    title: &str,
    url: &str,
) -> StoreResult<Decision> {
    if let Some(row) = store.find_news_by_title(title).await? {
        return Ok(Decision::Existing(row.id));
    }
    if let Some(row) = store.find_news_by_url(url).await? {
        return Ok(Decision::Existing(row.id));
    }
    if lookback.seen_hash(title, url) {
        return Ok(Decision::SkipSimilar);
    }
    Ok(Decision::Fresh)
}

/// Pre-insert check for a directory entry: normalized-URL match against
/// the whole table first, then a fuzzy name match. Returns the existing
/// row's id when found.
pub async fn check_website(store: &Store, name: &str, url: &str) -> StoreResult<Option<String>> {
    let normalized = normalize_site_url(url);
    for row in store.all_website_rows().await? {
        if normalize_site_url(&row.url) == normalized {
            return Ok(Some(row.id));
        }
    }
    if let Some(row) = store.find_website_by_name_like(name).await? {
        return Ok(Some(row.id));
    }
    Ok(None)
}

/// Pre-insert check for a WeChat account: exact name, then external id.
pub async fn check_wechat(
    store: &Store,
    name: &str,
    wechat_id: Option<&str>,
) -> StoreResult<Option<String>> {
    if let Some(row) = store.find_wechat_by_name(name).await? {
        return Ok(Some(row.id));
    }
    if let Some(wechat_id) = wechat_id.filter(|id| !id.trim().is_empty()) {
        if let Some(row) = store.find_wechat_by_wechat_id(wechat_id).await? {
            return Ok(Some(row.id));
        }
    }
    Ok(None)
}

/// Ids of every row whose key was already produced by an earlier row.
/// Rows must arrive in creation order; the first occurrence is the keeper.
fn duplicate_ids<'a, T>(
    rows: &'a [T],
    key: impl Fn(&T) -> String,
    id: impl Fn(&'a T) -> &'a str,
) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for row in rows {
        if !seen.insert(key(row)) {
            duplicates.push(id(row));
        }
    }
    duplicates
}

fn news_duplicate_ids(rows: &[NewsKey]) -> Vec<&str> {
    duplicate_ids(
        rows,
        |r| content_hash(&r.title, &r.original_url),
        |r| r.id.as_str(),
    )
}

fn website_duplicate_ids(rows: &[WebsiteRow]) -> Vec<&str> {
    duplicate_ids(rows, |r| normalize_site_url(&r.url), |r| r.id.as_str())
}

/// Accounts are duplicates when the name OR the (non-empty) external id
/// was seen before.
fn wechat_duplicate_ids(rows: &[WechatRow]) -> Vec<&str> {
    let mut names = HashSet::new();
    let mut ids = HashSet::new();
    let mut duplicates = Vec::new();
    for row in rows {
        let name = normalize_title(&row.name);
        let wechat_id = row
            .wechat_id
            .as_deref()
            .map(normalize_title)
            .filter(|id| !id.is_empty());

        let name_dup = names.contains(&name);
        let id_dup = wechat_id.as_ref().is_some_and(|id| ids.contains(id));
        if name_dup || id_dup {
            duplicates.push(row.id.as_str());
        } else {
            names.insert(name);
            if let Some(id) = wechat_id {
                ids.insert(id);
            }
        }
    }
    duplicates
}

/// Post-hoc cleanup of the news table; returns the number of rows deleted.
pub async fn cleanup_duplicate_news(store: &Store) -> StoreResult<usize> {
    info!("Starting duplicate news cleanup");
    let rows = store.all_news_keys().await?;
    let mut deleted = 0;
    for id in news_duplicate_ids(&rows) {
        match store.delete_news(id).await {
            Ok(true) => deleted += 1,
            Ok(false) => {}
            Err(e) => warn!(id, error = %e, "Failed to delete duplicate news row"),
        }
    }
    info!(deleted, "Duplicate news cleanup finished");
    Ok(deleted)
}

/// Post-hoc cleanup of the website directory, keyed on normalized URL.
pub async fn cleanup_duplicate_websites(store: &Store) -> StoreResult<usize> {
    info!("Starting duplicate website cleanup");
    let rows = store.all_website_rows().await?;
    let mut deleted = 0;
    for id in website_duplicate_ids(&rows) {
        match store.delete_website(id).await {
            Ok(true) => deleted += 1,
            Ok(false) => {}
            Err(e) => warn!(id, error = %e, "Failed to delete duplicate website"),
        }
    }
    info!(deleted, "Duplicate website cleanup finished");
    Ok(deleted)
}

/// Post-hoc cleanup of WeChat accounts, keyed on name and external id.
pub async fn cleanup_duplicate_wechat(store: &Store) -> StoreResult<usize> {
    info!("Starting duplicate WeChat account cleanup");
    let rows = store.all_wechat_rows().await?;
    let mut deleted = 0;
    for id in wechat_duplicate_ids(&rows) {
        match store.delete_wechat(id).await {
            Ok(true) => deleted += 1,
            Ok(false) => {}
            Err(e) => warn!(id, error = %e, "Failed to delete duplicate WeChat account"),
        }
    }
    info!(deleted, "Duplicate WeChat account cleanup finished");
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TitleMatch;

    fn news(id: &str, title: &str, url: &str) -> NewsKey {
        NewsKey {
            id: id.to_string(),
            title: title.to_string(),
            original_url: url.to_string(),
        }
    }

    #[test]
    fn test_lookback_exact_titles() {
        let mut index = LookbackIndex::empty(TitleMatch::Exact);
        index.remember("华为发布新芯片", "https://example.com/1");

        assert!(index.seen_title("华为发布新芯片"));
        assert!(index.seen_title("  华为发布新芯片  "));
        assert!(!index.seen_title("华为发布新芯片组"));
    }

    #[test]
    fn test_lookback_containment_titles() {
        let mut index = LookbackIndex::empty(TitleMatch::Containment);
        index.remember("华为发布新芯片", "https://example.com/1");

        // Either direction of containment counts as seen.
        assert!(index.seen_title("华为发布新芯片组"));
        assert!(index.seen_title("发布新芯片"));
        assert!(!index.seen_title("中芯国际扩产"));
    }

    #[test]
    fn test_lookback_hashes() {
        let mut index = LookbackIndex::empty(TitleMatch::Exact);
        index.remember("Chip News", "https://example.com/a");

        assert!(index.seen_hash("chip news", "HTTPS://EXAMPLE.COM/A"));
        assert!(!index.seen_hash("chip news", "https://example.com/b"));
    }

    #[test]
    fn test_news_duplicates_keep_first_occurrence() {
        let rows = vec![
            news("1", "标题甲", "https://example.com/a"),
            news("2", "标题乙", "https://example.com/b"),
            news("3", "标题甲", "https://example.com/a"),
            news("4", "  标题甲 ", "HTTPS://example.com/a"),
        ];
        assert_eq!(news_duplicate_ids(&rows), vec!["3", "4"]);
    }

    #[test]
    fn test_news_cleanup_is_idempotent() {
        let mut rows = vec![
            news("1", "标题甲", "https://example.com/a"),
            news("2", "标题甲", "https://example.com/a"),
        ];
        let doomed: Vec<String> = news_duplicate_ids(&rows)
            .into_iter()
            .map(String::from)
            .collect();
        rows.retain(|r| !doomed.contains(&r.id));
        // A second pass over the surviving rows finds nothing.
        assert!(news_duplicate_ids(&rows).is_empty());
    }

    #[test]
    fn test_website_duplicates_normalize_urls() {
        let rows = vec![
            WebsiteRow {
                id: "1".to_string(),
                name: "SemiWiki".to_string(),
                url: "https://www.semiwiki.com/".to_string(),
            },
            WebsiteRow {
                id: "2".to_string(),
                name: "SemiWiki Mirror".to_string(),
                url: "HTTPS://WWW.SEMIWIKI.COM".to_string(),
            },
        ];
        assert_eq!(website_duplicate_ids(&rows), vec!["2"]);
    }

    #[test]
    fn test_wechat_duplicates_by_name_or_external_id() {
        let account = |id: &str, name: &str, wid: Option<&str>| WechatRow {
            id: id.to_string(),
            name: name.to_string(),
            wechat_id: wid.map(String::from),
        };
        let rows = vec![
            account("1", "芯片大师", Some("ChipMaster")),
            account("2", "芯片大师", Some("other_id")),
            account("3", "另一个号", Some("chipmaster")),
            account("4", "独立账号", None),
            account("5", "第三个号", Some("")),
        ];
        // 2 repeats the name, 3 repeats the external id (case-folded);
        // empty external ids never collide.
        assert_eq!(wechat_duplicate_ids(&rows), vec!["2", "3"]);
    }
}
