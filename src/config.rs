//! Runtime configuration.
//!
//! Everything is read from the process environment once at startup;
//! missing store credentials are fatal, everything else falls back to a
//! default. The news source table ships built in and can be overridden
//! with a YAML file via `--sources`.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

/// How strictly the in-memory lookback set compares titles.
///
/// `Exact` is plain set membership. `Containment` treats a candidate as
/// seen when either title contains the other — the historically looser
/// check used for feed items, kept selectable because it can over-reject
/// legitimately distinct short titles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TitleMatch {
    #[default]
    Exact,
    Containment,
}

impl FromStr for TitleMatch {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(TitleMatch::Exact),
            "containment" => Ok(TitleMatch::Containment),
            other => bail!("invalid DEDUP_TITLE_MATCH value: {other}"),
        }
    }
}

/// Per-source scrape configuration, dispatched by variant: structured
/// feeds carry at most a content selector hint, HTML listing pages carry
/// the full selector set.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Feed(FeedSource),
    Html(HtmlSource),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub content_selector: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HtmlSource {
    pub name: String,
    pub url: String,
    pub selectors: ListSelectors,
}

/// CSS selectors for enumerating candidates on an HTML listing page.
#[derive(Debug, Clone, Deserialize)]
pub struct ListSelectors {
    pub list: String,
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl SourceConfig {
    pub fn name(&self) -> &str {
        match self {
            SourceConfig::Feed(f) => &f.name,
            SourceConfig::Html(h) => &h.name,
        }
    }

    /// Source-specific hint for the content extractor, when configured.
    pub fn content_selector(&self) -> Option<&str> {
        match self {
            SourceConfig::Feed(f) => f.content_selector.as_deref(),
            SourceConfig::Html(h) => h.selectors.content.as_deref(),
        }
    }
}

/// AI summarization gateway settings.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub openai_api_key: Option<String>,
    pub claude_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    /// Provider tried first; the remaining configured providers follow in
    /// default order.
    pub preferred_service: String,
    /// Body text is hard-truncated to this many characters before
    /// prompting.
    pub max_content_length: usize,
    /// Cap applied to summaries recovered from unstructured replies.
    pub summary_max_length: usize,
    /// Page size of the not-yet-processed batch driver.
    pub batch_size: usize,
    /// Pause between provider calls inside a batch, in seconds.
    pub call_delay_secs: u64,
}

/// Scheduler cadence, in hours per job.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub news_interval_hours: u64,
    pub websites_interval_hours: u64,
    pub accounts_interval_hours: u64,
    pub summaries_interval_hours: u64,
    pub cleanup_interval_hours: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_key: String,
    pub user_agent: String,
    /// Politeness pause between sources / probes, in seconds. Deliberate
    /// rate-limit control, not an accidental bottleneck.
    pub crawl_delay_secs: u64,
    pub download_timeout_secs: u64,
    pub website_check_timeout_secs: u64,
    /// Minimum character count for `is_relevant`.
    pub content_min_length: usize,
    /// Lookback window for dedup checks, in days.
    pub duplicate_threshold_days: i64,
    pub title_match: TitleMatch,
    pub ai: AiConfig,
    pub schedule: ScheduleConfig,
    pub sources: Vec<SourceConfig>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from the environment. Missing store credentials
    /// are a startup-fatal error; the process must not proceed without
    /// them.
    pub fn from_env(sources_file: Option<&Path>) -> Result<Self> {
        let supabase_url =
            std::env::var("SUPABASE_URL").context("SUPABASE_URL must be set")?;
        let supabase_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .context("SUPABASE_SERVICE_ROLE_KEY must be set")?;

        let sources = match sources_file {
            Some(path) => load_sources(path)?,
            None => default_sources(),
        };

        Ok(Self {
            supabase_url,
            supabase_key,
            user_agent: env_or("USER_AGENT", "IC123-Crawler/1.0"),
            crawl_delay_secs: env_parse("CRAWL_DELAY", 1),
            download_timeout_secs: env_parse("DOWNLOAD_TIMEOUT", 30),
            website_check_timeout_secs: env_parse("WEBSITE_CHECK_TIMEOUT", 10),
            content_min_length: env_parse("CONTENT_MIN_LENGTH", 50),
            duplicate_threshold_days: env_parse("DUPLICATE_THRESHOLD_DAYS", 7),
            title_match: std::env::var("DEDUP_TITLE_MATCH")
                .ok()
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or_default(),
            ai: AiConfig {
                openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
                claude_api_key: std::env::var("CLAUDE_API_KEY").ok(),
                gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
                preferred_service: env_or("AI_SUMMARY_SERVICE", "openai"),
                max_content_length: env_parse("AI_MAX_CONTENT_LENGTH", 4000),
                summary_max_length: env_parse("AI_SUMMARY_MAX_LENGTH", 200),
                batch_size: env_parse("AI_BATCH_SIZE", 10),
                call_delay_secs: env_parse("AI_CALL_DELAY", 1),
            },
            schedule: ScheduleConfig {
                news_interval_hours: env_parse("SCHEDULE_NEWS_INTERVAL_HOURS", 4),
                websites_interval_hours: env_parse("SCHEDULE_WEBSITES_INTERVAL_HOURS", 24),
                accounts_interval_hours: env_parse("SCHEDULE_ACCOUNTS_INTERVAL_HOURS", 168),
                summaries_interval_hours: env_parse("SCHEDULE_SUMMARIES_INTERVAL_HOURS", 24),
                cleanup_interval_hours: env_parse("SCHEDULE_CLEANUP_INTERVAL_HOURS", 24),
            },
            sources,
        })
    }
}

/// Read a source table from a YAML file.
pub fn load_sources(path: &Path) -> Result<Vec<SourceConfig>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read sources file {}", path.display()))?;
    let sources: Vec<SourceConfig> = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse sources file {}", path.display()))?;
    if sources.is_empty() {
        bail!("sources file {} contains no sources", path.display());
    }
    Ok(sources)
}

/// The built-in source table.
pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::Feed(FeedSource {
            name: "EETimes".to_string(),
            url: "https://www.eetimes.com/feed/".to_string(),
            content_selector: Some(".entry-content".to_string()),
        }),
        SourceConfig::Feed(FeedSource {
            name: "Electronic Design".to_string(),
            url: "https://www.electronicdesign.com/rss.xml".to_string(),
            content_selector: Some(".content".to_string()),
        }),
        SourceConfig::Html(HtmlSource {
            name: "SemiWiki".to_string(),
            url: "https://www.semiwiki.com/".to_string(),
            selectors: ListSelectors {
                list: ".post-item, .entry".to_string(),
                title: ".post-title a, .entry-title a, h2 a".to_string(),
                link: ".post-title a, .entry-title a, h2 a".to_string(),
                summary: Some(".post-excerpt, .entry-summary".to_string()),
                date: Some(".post-date, .entry-date".to_string()),
                content: None,
            },
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sources_cover_both_variants() {
        let sources = default_sources();
        assert_eq!(sources.len(), 3);
        assert!(matches!(sources[0], SourceConfig::Feed(_)));
        assert!(matches!(sources[2], SourceConfig::Html(_)));
        assert_eq!(sources[0].name(), "EETimes");
        assert_eq!(sources[0].content_selector(), Some(".entry-content"));
        assert_eq!(sources[2].content_selector(), None);
    }

    #[test]
    fn test_sources_yaml_parses_tagged_variants() {
        let yaml = r#"
- type: feed
  name: EETimes
  url: https://www.eetimes.com/feed/
  content_selector: ".entry-content"
- type: html
  name: SemiWiki
  url: https://www.semiwiki.com/
  selectors:
    list: ".post-item"
    title: "h2 a"
    link: "h2 a"
    summary: ".post-excerpt"
"#;
        let sources: Vec<SourceConfig> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(sources.len(), 2);
        match &sources[1] {
            SourceConfig::Html(h) => {
                assert_eq!(h.selectors.list, ".post-item");
                assert_eq!(h.selectors.summary.as_deref(), Some(".post-excerpt"));
                assert!(h.selectors.date.is_none());
            }
            other => panic!("expected html source, got {other:?}"),
        }
    }

    #[test]
    fn test_title_match_parse() {
        assert_eq!(TitleMatch::from_str("exact").unwrap(), TitleMatch::Exact);
        assert_eq!(
            TitleMatch::from_str("Containment").unwrap(),
            TitleMatch::Containment
        );
        assert!(TitleMatch::from_str("fuzzy").is_err());
    }
}
