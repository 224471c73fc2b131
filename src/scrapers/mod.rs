//! Source adapters and content extraction.
//!
//! Each configured source is fetched through one entry point,
//! [`fetch_candidates`], which dispatches on the [`SourceConfig`] variant:
//!
//! | Variant | Module | Method |
//! |---------|--------|--------|
//! | Feed    | [`feed`] | RSS/Atom document parsing |
//! | Html    | [`html`] | CSS selectors over a listing page |
//!
//! Both adapters resolve relative links against the source URL, drop
//! candidates whose title is irrelevant or already in the run's lookback
//! set, and skip broken elements individually instead of failing the
//! page. A failure to fetch the source itself propagates so the owning
//! job can record exactly one error for that source.

pub mod accounts;
pub mod content;
pub mod feed;
pub mod html;

use std::time::Duration;

use anyhow::Result;

use crate::config::{Config, SourceConfig};
use crate::dedup::LookbackIndex;
use crate::models::Candidate;

/// Shared page-fetching client: configured User-Agent and the content
/// download timeout.
pub fn page_client(config: &Config) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.download_timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
}

/// Fetch candidate articles from one configured source.
pub async fn fetch_candidates(
    client: &reqwest::Client,
    source: &SourceConfig,
    lookback: &LookbackIndex,
    config: &Config,
) -> Result<Vec<Candidate>> {
    match source {
        SourceConfig::Feed(feed_source) => {
            feed::fetch(client, feed_source, lookback, config.content_min_length).await
        }
        SourceConfig::Html(html_source) => {
            html::fetch(client, html_source, lookback, config.content_min_length).await
        }
    }
}
