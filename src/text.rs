//! Shared text utilities: markup stripping, summary extraction, date
//! parsing, keyword classification and URL normalization.
//!
//! Everything here is pure and synchronous; the scrapers, the dedup engine
//! and the AI gateway all funnel their text through these helpers so that
//! "normalized" means the same thing everywhere in the pipeline.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Date patterns tried in priority order: ISO-like numeric forms first,
/// then the localized year/month/day forms. Order matters — the first
/// pattern that matches wins.
static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(\d{4})-(\d{1,2})-(\d{1,2})\s+(\d{1,2}):(\d{1,2}):(\d{1,2})",
        r"(\d{4})-(\d{1,2})-(\d{1,2})\s+(\d{1,2}):(\d{1,2})",
        r"(\d{4})-(\d{1,2})-(\d{1,2})",
        r"(\d{4})年(\d{1,2})月(\d{1,2})日",
        r"(\d{1,2})月(\d{1,2})日",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Ordered category table. First keyword hit wins, so broader buckets
/// (产品发布 also matches 芯片) deliberately sit below the narrower ones.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("制造工艺", &["制造", "工艺", "制程", "7nm", "5nm", "3nm", "晶圆", "代工"]),
    ("设计工具", &["eda", "设计", "cadence", "synopsys", "mentor"]),
    ("市场分析", &["市场", "预测", "分析", "增长", "营收", "份额", "报告"]),
    ("投资并购", &["投资", "并购", "收购", "融资", "上市", "募资", "估值"]),
    ("技术创新", &["技术", "创新", "突破", "专利", "研发", "算法", "架构"]),
    ("政策法规", &["政策", "法规", "标准", "规范", "监管", "审查", "制裁"]),
    ("人事变动", &["人事", "任命", "离职", "加入", "ceo", "cto", "高管"]),
    ("产品发布", &["发布", "推出", "上市", "产品", "芯片", "处理器"]),
];

/// Fallback bucket for articles no category keyword claims.
pub const DEFAULT_CATEGORY: &str = "行业动态";

/// Keywords that mark a text as belonging to the IC industry. Stored
/// lowercased; matching is case-insensitive substring.
const DOMAIN_KEYWORDS: &[&str] = &["半导体", "ic", "芯片", "集成电路", "semiconductor"];

/// Strip markup tags and collapse whitespace runs into single spaces.
pub fn clean_text(raw: &str) -> String {
    let without_tags = TAG_RE.replace_all(raw, "");
    WS_RE.replace_all(&without_tags, " ").trim().to_string()
}

/// Extract a summary of at most `max_len` characters from `content`.
///
/// Returns the cleaned content unchanged when it already fits. Otherwise
/// whole sentences (split on `。`) are accumulated until the next one would
/// exceed the limit; if not even the first sentence fits, the text is
/// hard-truncated with an ellipsis.
pub fn extract_summary(content: &str, max_len: usize) -> String {
    let clean = clean_text(content);
    if clean.chars().count() <= max_len {
        return clean;
    }

    let mut summary = String::new();
    let mut used = 0usize;
    for sentence in clean.split('。') {
        let cost = sentence.chars().count() + 1;
        if used + cost > max_len {
            break;
        }
        summary.push_str(sentence);
        summary.push('。');
        used += cost;
    }

    if summary.is_empty() {
        summary = clean
            .chars()
            .take(max_len.saturating_sub(3))
            .collect::<String>();
        summary.push_str("...");
    }
    summary
}

/// Parse a free-form date string against [`DATE_PATTERNS`].
///
/// Returns `None` when nothing matches; callers treat that as a non-fatal
/// condition, log a warning and fall back to the current time — publish
/// dates scraped off listing pages are best-effort metadata, not
/// authoritative.
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if text.trim().is_empty() {
        return None;
    }

    for re in DATE_PATTERNS.iter() {
        let Some(caps) = re.captures(text) else {
            continue;
        };
        let nums: Vec<u32> = caps
            .iter()
            .skip(1)
            .flatten()
            .filter_map(|m| m.as_str().parse().ok())
            .collect();

        let (year, month, day, hour, minute, second) = match nums.len() {
            6 => (nums[0] as i32, nums[1], nums[2], nums[3], nums[4], nums[5]),
            5 => (nums[0] as i32, nums[1], nums[2], nums[3], nums[4], 0),
            3 => (nums[0] as i32, nums[1], nums[2], 0, 0, 0),
            // Month/day form carries no year; assume the current one.
            2 => (Utc::now().year(), nums[0], nums[1], 0, 0, 0),
            _ => continue,
        };

        if let chrono::LocalResult::Single(dt) =
            Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        {
            return Some(dt);
        }
    }

    None
}

/// Classify an article into the fixed category taxonomy.
///
/// Title and body are lowercased and concatenated, then checked against the
/// ordered category table; the first category with any keyword present
/// wins, otherwise [`DEFAULT_CATEGORY`].
pub fn categorize(title: &str, content: &str) -> &'static str {
    let haystack = format!("{} {}", title, content).to_lowercase();
    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|k| haystack.contains(k)) {
            return category;
        }
    }
    DEFAULT_CATEGORY
}

/// Whether a text is worth keeping: at least `min_len` characters AND at
/// least one IC-industry keyword present (case-insensitive).
pub fn is_relevant(text: &str, min_len: usize) -> bool {
    if text.chars().count() < min_len {
        return false;
    }
    let lower = text.to_lowercase();
    DOMAIN_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Resolve `href` against `base` when it is relative, then strip any
/// trailing slash. Unresolvable input is returned as-is (minus the slash)
/// so validation can reject it downstream.
pub fn normalize_url(href: &str, base: Option<&str>) -> String {
    if href.is_empty() {
        return String::new();
    }

    let absolute = if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        base.and_then(|b| Url::parse(b).ok())
            .and_then(|b| b.join(href).ok())
            .map(|u| u.to_string())
            .unwrap_or_else(|| href.to_string())
    };

    absolute.trim_end_matches('/').to_string()
}

/// Coarse duplicate fingerprint: hex digest over the lowercased, trimmed
/// title concatenated with the lowercased, trimmed URL.
pub fn content_hash(title: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.trim().to_lowercase().as_bytes());
    hasher.update(url.trim().to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}
