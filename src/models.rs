//! Data models for the pipeline: scraped candidates, store row shapes and
//! insert payloads.
//!
//! Row structs are deliberately narrow — each one mirrors the column set a
//! specific query selects, rather than one wide struct with everything
//! optional. Insert payloads serialize exactly the columns the store
//! expects to receive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

/// A scraped article before deduplication and validation decide whether it
/// is persisted.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub title: String,
    pub summary: String,
    pub url: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub category: &'static str,
    pub tags: Vec<String>,
}

/// Insert payload for the `news` table.
#[derive(Debug, Clone, Serialize)]
pub struct NewArticle {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub source: String,
    pub original_url: String,
    pub published_at: DateTime<Utc>,
    pub category: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub crawled_at: DateTime<Utc>,
}

impl NewArticle {
    /// Build an insert payload from a surviving candidate, attaching the
    /// extracted body text when the content extractor produced one.
    pub fn from_candidate(candidate: Candidate, content: Option<String>) -> Self {
        let now = Utc::now();
        let summary = if candidate.summary.is_empty() {
            None
        } else {
            Some(candidate.summary)
        };
        Self {
            title: candidate.title,
            summary,
            content,
            source: candidate.source,
            original_url: candidate.url,
            published_at: candidate.published_at,
            category: candidate.category.to_string(),
            tags: candidate.tags,
            created_at: now,
            crawled_at: now,
        }
    }

    /// Validation gate before insert: required fields present, title at
    /// least 5 characters, origin URL absolute. Invalid candidates are
    /// dropped, not retried.
    pub fn is_valid(&self) -> bool {
        if self.source.is_empty() {
            warn!("Missing required field: source");
            return false;
        }
        if self.title.chars().count() < 5 {
            warn!(title = %self.title, "Title too short");
            return false;
        }
        match Url::parse(&self.original_url) {
            Ok(parsed) if parsed.has_host() => true,
            _ => {
                warn!(url = %self.original_url, "Invalid URL format");
                false
            }
        }
    }
}

/// Minimal row used by existence checks (`select id`).
#[derive(Debug, Clone, Deserialize)]
pub struct IdRow {
    pub id: String,
}

/// Row used for lookback loading and post-hoc duplicate scans.
#[derive(Debug, Clone, Deserialize)]
pub struct NewsKey {
    pub id: String,
    pub title: String,
    pub original_url: String,
}

/// Row used by the lookback title set (`select title`).
#[derive(Debug, Clone, Deserialize)]
pub struct NewsTitle {
    pub title: String,
}

/// An article awaiting AI summarization.
#[derive(Debug, Clone, Deserialize)]
pub struct PendingNews {
    pub id: String,
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub source: String,
}

impl PendingNews {
    /// Best text available to feed the summarizer: full body, else the
    /// scraped summary, else the bare title.
    pub fn body_for_ai(&self) -> &str {
        self.content
            .as_deref()
            .or(self.summary.as_deref())
            .unwrap_or(&self.title)
    }
}

/// Directory entry row as the health checker and cleanup passes see it.
#[derive(Debug, Clone, Deserialize)]
pub struct WebsiteRow {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// Insert payload for the `websites` table.
#[derive(Debug, Clone, Serialize)]
pub struct NewWebsite {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// WeChat account row as dedup and existence checks see it.
#[derive(Debug, Clone, Deserialize)]
pub struct WechatRow {
    pub id: String,
    pub name: String,
    pub wechat_id: Option<String>,
}

/// Insert payload for the `wechat_accounts` table.
#[derive(Debug, Clone, Serialize)]
pub struct NewWechatAccount {
    pub name: String,
    pub wechat_id: String,
    pub description: String,
    pub positioning: String,
    pub target_audience: String,
    pub operator_background: String,
    pub tags: Vec<String>,
    pub is_verified: bool,
    pub follower_count: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Error,
}

/// Append-only audit record: one row per job invocation (or per job
/// failure).
#[derive(Debug, Clone, Serialize)]
pub struct NewCrawlLog {
    pub source: String,
    pub status: LogStatus,
    pub message: String,
    pub items_count: i64,
    pub crawled_at: DateTime<Utc>,
}

impl NewCrawlLog {
    pub fn success(source: &str, message: String, items_count: i64) -> Self {
        Self {
            source: source.to_string(),
            status: LogStatus::Success,
            message,
            items_count,
            crawled_at: Utc::now(),
        }
    }

    pub fn error(source: &str, message: String) -> Self {
        Self {
            source: source.to_string(),
            status: LogStatus::Error,
            message,
            items_count: 0,
            crawled_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> Candidate {
        Candidate {
            title: "中芯国际发布新制程".to_string(),
            summary: "摘要".to_string(),
            url: "https://example.com/news/1".to_string(),
            source: "EETimes".to_string(),
            published_at: Utc::now(),
            category: "制造工艺",
            tags: vec!["EETimes".to_string(), "RSS".to_string()],
        }
    }

    #[test]
    fn test_from_candidate_fills_timestamps() {
        let article = NewArticle::from_candidate(candidate(), Some("正文".to_string()));
        assert_eq!(article.category, "制造工艺");
        assert_eq!(article.summary.as_deref(), Some("摘要"));
        assert_eq!(article.content.as_deref(), Some("正文"));
        assert_eq!(article.created_at, article.crawled_at);
    }

    #[test]
    fn test_from_candidate_empty_summary_becomes_none() {
        let mut c = candidate();
        c.summary = String::new();
        let article = NewArticle::from_candidate(c, None);
        assert!(article.summary.is_none());
    }

    #[test]
    fn test_is_valid_accepts_complete_article() {
        assert!(NewArticle::from_candidate(candidate(), None).is_valid());
    }

    #[test]
    fn test_is_valid_rejects_short_title() {
        let mut c = candidate();
        c.title = "芯片".to_string();
        assert!(!NewArticle::from_candidate(c, None).is_valid());
    }

    #[test]
    fn test_is_valid_rejects_relative_url() {
        let mut c = candidate();
        c.url = "/news/1".to_string();
        assert!(!NewArticle::from_candidate(c, None).is_valid());
    }

    #[test]
    fn test_is_valid_rejects_empty_source() {
        let mut c = candidate();
        c.source = String::new();
        assert!(!NewArticle::from_candidate(c, None).is_valid());
    }

    #[test]
    fn test_insert_payload_omits_absent_optionals() {
        let mut c = candidate();
        c.summary = String::new();
        let json = serde_json::to_value(NewArticle::from_candidate(c, None)).unwrap();
        assert!(json.get("summary").is_none());
        assert!(json.get("content").is_none());
        assert_eq!(json["source"], "EETimes");
    }

    #[test]
    fn test_crawl_log_status_serializes_lowercase() {
        let log = NewCrawlLog::error("news_scraper", "boom".to_string());
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["items_count"], 0);
    }

    #[test]
    fn test_pending_news_body_preference() {
        let mut pending = PendingNews {
            id: "1".to_string(),
            title: "标题五个字".to_string(),
            summary: Some("摘要".to_string()),
            content: Some("正文".to_string()),
            source: "EETimes".to_string(),
        };
        assert_eq!(pending.body_for_ai(), "正文");
        pending.content = None;
        assert_eq!(pending.body_for_ai(), "摘要");
        pending.summary = None;
        assert_eq!(pending.body_for_ai(), "标题五个字");
    }
}
