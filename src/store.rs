//! Record store client.
//!
//! The persistent store is a PostgREST-style HTTP API (Supabase): every
//! operation is table-scoped with a small filter vocabulary — equality,
//! greater-or-equal, `ilike` — plus ordering, limits and an exact row
//! count. Nothing in the pipeline issues anything richer than that, and
//! all row shapes live in [`crate::models`].

use std::time::Duration;

use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::{
    IdRow, NewArticle, NewCrawlLog, NewWebsite, NewWechatAccount, NewsKey, NewsTitle, PendingNews,
    WebsiteRow, WechatRow,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store returned {status} for {table}: {body}")]
    Api {
        table: String,
        status: StatusCode,
        body: String,
    },
    #[error("insert into {table} returned no row")]
    MissingRow { table: String },
    #[error("invalid store configuration: {0}")]
    Config(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The filter vocabulary the store exposes. Values are passed through
/// reqwest's query encoding, so they may contain anything.
#[derive(Debug, Clone)]
pub enum Filter {
    Eq(&'static str, String),
    Gte(&'static str, String),
    Ilike(&'static str, String),
}

impl Filter {
    fn query_pair(&self) -> (String, String) {
        match self {
            Filter::Eq(col, v) => ((*col).to_string(), format!("eq.{v}")),
            Filter::Gte(col, v) => ((*col).to_string(), format!("gte.{v}")),
            Filter::Ilike(col, v) => ((*col).to_string(), format!("ilike.{v}")),
        }
    }
}

/// Parse the total out of a `Content-Range` header value like `0-24/3573`
/// or `*/0`.
fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.parse().ok()
}

pub struct Store {
    http: reqwest::Client,
    base: String,
}

impl Store {
    /// Build the store client once at startup. The service key goes into
    /// default headers; a key that cannot be represented as a header value
    /// is a configuration error.
    pub fn new(config: &Config) -> StoreResult<Self> {
        let key = HeaderValue::from_str(&config.supabase_key)
            .map_err(|_| StoreError::Config("service role key is not a valid header value".into()))?;
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.supabase_key))
            .map_err(|_| StoreError::Config("service role key is not a valid header value".into()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base: format!("{}/rest/v1", config.supabase_url.trim_end_matches('/')),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{table}", self.base)
    }

    async fn expect_ok(table: &str, resp: reqwest::Response) -> StoreResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(StoreError::Api {
            table: table.to_string(),
            status,
            body,
        })
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        columns: &str,
        filters: &[Filter],
        order: Option<&str>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<T>> {
        let mut query: Vec<(String, String)> = vec![("select".to_string(), columns.to_string())];
        query.extend(filters.iter().map(Filter::query_pair));
        if let Some(order) = order {
            query.push(("order".to_string(), order.to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit".to_string(), limit.to_string()));
        }

        debug!(table, ?query, "store select");
        let resp = self.http.get(self.table_url(table)).query(&query).send().await?;
        Ok(Self::expect_ok(table, resp).await?.json().await?)
    }

    async fn insert<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        row: &T,
    ) -> StoreResult<R> {
        let resp = self
            .http
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;
        let rows: Vec<R> = Self::expect_ok(table, resp).await?.json().await?;
        rows.into_iter().next().ok_or_else(|| StoreError::MissingRow {
            table: table.to_string(),
        })
    }

    /// Update rows matching the filters; returns how many rows changed.
    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: &serde_json::Value,
    ) -> StoreResult<usize> {
        let query: Vec<(String, String)> = filters.iter().map(Filter::query_pair).collect();
        let resp = self
            .http
            .patch(self.table_url(table))
            .query(&query)
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await?;
        let rows: Vec<serde_json::Value> = Self::expect_ok(table, resp).await?.json().await?;
        Ok(rows.len())
    }

    /// Delete rows matching the filters; returns how many rows vanished.
    async fn delete(&self, table: &str, filters: &[Filter]) -> StoreResult<usize> {
        let query: Vec<(String, String)> = filters.iter().map(Filter::query_pair).collect();
        let resp = self
            .http
            .delete(self.table_url(table))
            .query(&query)
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let rows: Vec<serde_json::Value> = Self::expect_ok(table, resp).await?.json().await?;
        Ok(rows.len())
    }

    /// Exact row count for a table.
    pub async fn table_count(&self, table: &str) -> StoreResult<u64> {
        let resp = self
            .http
            .head(self.table_url(table))
            .query(&[("select", "id")])
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let resp = Self::expect_ok(table, resp).await?;
        Ok(resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(content_range_total)
            .unwrap_or(0))
    }

    fn cutoff_rfc3339(days: i64) -> String {
        (Utc::now() - chrono::Duration::days(days)).to_rfc3339()
    }

    // --- news -----------------------------------------------------------

    pub async fn find_news_by_title(&self, title: &str) -> StoreResult<Option<IdRow>> {
        let rows: Vec<IdRow> = self
            .select(
                "news",
                "id",
                &[Filter::Eq("title", title.trim().to_string())],
                None,
                Some(1),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn find_news_by_url(&self, url: &str) -> StoreResult<Option<IdRow>> {
        let rows: Vec<IdRow> = self
            .select(
                "news",
                "id",
                &[Filter::Eq("original_url", url.trim().to_string())],
                None,
                Some(1),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Title/URL pairs created within the lookback window, for seeding the
    /// in-memory dedup index.
    pub async fn recent_news_keys(&self, days: i64) -> StoreResult<Vec<NewsKey>> {
        self.select(
            "news",
            "id,title,original_url",
            &[Filter::Gte("created_at", Self::cutoff_rfc3339(days))],
            None,
            None,
        )
        .await
    }

    pub async fn recent_news_titles(&self, days: i64) -> StoreResult<Vec<String>> {
        let rows: Vec<NewsTitle> = self
            .select(
                "news",
                "title",
                &[Filter::Gte("created_at", Self::cutoff_rfc3339(days))],
                None,
                None,
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.title).collect())
    }

    pub async fn insert_news(&self, article: &NewArticle) -> StoreResult<IdRow> {
        self.insert("news", article).await
    }

    /// Every news row in creation order — the post-hoc cleanup scan.
    pub async fn all_news_keys(&self) -> StoreResult<Vec<NewsKey>> {
        self.select(
            "news",
            "id,title,original_url",
            &[],
            Some("created_at.asc"),
            None,
        )
        .await
    }

    pub async fn delete_news(&self, id: &str) -> StoreResult<bool> {
        Ok(self
            .delete("news", &[Filter::Eq("id", id.to_string())])
            .await?
            > 0)
    }

    /// A page of articles that have not been through the AI gateway yet.
    pub async fn pending_ai_news(&self, limit: usize) -> StoreResult<Vec<PendingNews>> {
        self.select(
            "news",
            "id,title,summary,content,source",
            &[Filter::Eq("ai_processed", "false".to_string())],
            None,
            Some(limit),
        )
        .await
    }

    /// Patch AI results into an article. Summary, keywords, processed flag
    /// and timestamp travel in one update so the record can never read
    /// processed without a summary.
    pub async fn mark_news_summarized(
        &self,
        id: &str,
        summary: &str,
        keywords: &[String],
    ) -> StoreResult<bool> {
        let patch = serde_json::json!({
            "ai_summary": summary,
            "ai_keywords": keywords,
            "ai_processed": true,
            "ai_processed_at": Utc::now().to_rfc3339(),
        });
        Ok(self
            .update("news", &[Filter::Eq("id", id.to_string())], &patch)
            .await?
            > 0)
    }

    // --- websites -------------------------------------------------------

    /// Active directory entries due for a health probe.
    pub async fn websites_for_check(&self) -> StoreResult<Vec<WebsiteRow>> {
        self.select(
            "websites",
            "id,name,url",
            &[Filter::Eq("is_active", "true".to_string())],
            None,
            None,
        )
        .await
    }

    /// Every directory entry in creation order — the cleanup scan.
    pub async fn all_website_rows(&self) -> StoreResult<Vec<WebsiteRow>> {
        self.select("websites", "id,name,url", &[], Some("created_at.asc"), None)
            .await
    }

    pub async fn find_website_by_name_like(&self, name: &str) -> StoreResult<Option<IdRow>> {
        let rows: Vec<IdRow> = self
            .select(
                "websites",
                "id",
                &[Filter::Ilike("name", format!("%{}%", name.trim()))],
                None,
                Some(1),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn insert_website(&self, website: &NewWebsite) -> StoreResult<IdRow> {
        self.insert("websites", website).await
    }

    /// Record a probe outcome on the directory entry. Runs for every probe
    /// regardless of result.
    pub async fn update_website_status(
        &self,
        id: &str,
        is_active: bool,
        note: Option<&str>,
    ) -> StoreResult<bool> {
        let mut patch = serde_json::json!({
            "is_active": is_active,
            "updated_at": Utc::now().to_rfc3339(),
        });
        if let Some(note) = note {
            patch["admin_notes"] = serde_json::Value::String(note.to_string());
        }
        Ok(self
            .update("websites", &[Filter::Eq("id", id.to_string())], &patch)
            .await?
            > 0)
    }

    pub async fn delete_website(&self, id: &str) -> StoreResult<bool> {
        Ok(self
            .delete("websites", &[Filter::Eq("id", id.to_string())])
            .await?
            > 0)
    }

    /// Remove every directory entry the health checker has already marked
    /// inactive.
    pub async fn delete_inactive_websites(&self) -> StoreResult<usize> {
        self.delete("websites", &[Filter::Eq("is_active", "false".to_string())])
            .await
    }

    // --- wechat accounts ------------------------------------------------

    pub async fn all_wechat_rows(&self) -> StoreResult<Vec<WechatRow>> {
        self.select(
            "wechat_accounts",
            "id,name,wechat_id",
            &[],
            Some("created_at.asc"),
            None,
        )
        .await
    }

    pub async fn find_wechat_by_name(&self, name: &str) -> StoreResult<Option<IdRow>> {
        let rows: Vec<IdRow> = self
            .select(
                "wechat_accounts",
                "id",
                &[Filter::Eq("name", name.trim().to_string())],
                None,
                Some(1),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn find_wechat_by_wechat_id(&self, wechat_id: &str) -> StoreResult<Option<IdRow>> {
        let rows: Vec<IdRow> = self
            .select(
                "wechat_accounts",
                "id",
                &[Filter::Eq("wechat_id", wechat_id.trim().to_string())],
                None,
                Some(1),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn insert_wechat(&self, account: &NewWechatAccount) -> StoreResult<IdRow> {
        self.insert("wechat_accounts", account).await
    }

    pub async fn delete_wechat(&self, id: &str) -> StoreResult<bool> {
        Ok(self
            .delete("wechat_accounts", &[Filter::Eq("id", id.to_string())])
            .await?
            > 0)
    }

    // --- audit log ------------------------------------------------------

    /// Append an audit row. Best-effort: a failing audit write is logged
    /// and swallowed, it must never take a job down with it.
    pub async fn append_crawl_log(&self, entry: &NewCrawlLog) {
        let resp = self
            .http
            .post(self.table_url("crawl_logs"))
            .json(entry)
            .send()
            .await;
        match resp {
            Ok(resp) if resp.status().is_success() => {
                debug!(source = %entry.source, status = ?entry.status, "crawl log appended");
            }
            Ok(resp) => {
                warn!(source = %entry.source, status = %resp.status(), "crawl log rejected");
            }
            Err(e) => {
                warn!(source = %entry.source, error = %e, "crawl log write failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_query_pairs() {
        assert_eq!(
            Filter::Eq("title", "芯片新闻".to_string()).query_pair(),
            ("title".to_string(), "eq.芯片新闻".to_string())
        );
        assert_eq!(
            Filter::Gte("created_at", "2024-01-01".to_string()).query_pair(),
            ("created_at".to_string(), "gte.2024-01-01".to_string())
        );
        assert_eq!(
            Filter::Ilike("name", "%半导体%".to_string()).query_pair(),
            ("name".to_string(), "ilike.%半导体%".to_string())
        );
    }

    #[test]
    fn test_content_range_total() {
        assert_eq!(content_range_total("0-24/3573"), Some(3573));
        assert_eq!(content_range_total("*/0"), Some(0));
        assert_eq!(content_range_total("garbage"), None);
    }

    #[test]
    fn test_cutoff_is_in_the_past() {
        let cutoff = Store::cutoff_rfc3339(7);
        let parsed = chrono::DateTime::parse_from_rfc3339(&cutoff).unwrap();
        assert!(parsed < Utc::now());
    }
}
