//! Named pipeline jobs.
//!
//! Every job takes the shared [`JobContext`] and runs to completion or
//! failure on its own. Inside a job, per-item and per-source failures are
//! absorbed and logged; a job-level failure propagates to the caller —
//! the CLI turns it into a non-zero exit, the scheduler logs it and keeps
//! the loop alive ([`run_isolated`]).

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use itertools::Itertools;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use crate::ai::Summarizer;
use crate::config::Config;
use crate::dedup::{self, Decision, LookbackIndex};
use crate::health::{self, CheckReport};
use crate::models::{Candidate, NewArticle, NewCrawlLog, NewWebsite};
use crate::scrapers::{self, accounts, content};
use crate::store::Store;
use crate::text::{extract_summary, normalize_url};

/// Summary length used when deriving a missing summary from the body.
const SUMMARY_MAX_CHARS: usize = 200;

/// Pause between the stages of the full-update composite.
const STAGE_PAUSE: Duration = Duration::from_secs(2);

/// Dependencies shared by every job, constructed once at process start
/// and passed in explicitly.
pub struct JobContext {
    pub config: Config,
    pub store: Store,
    pub summarizer: Summarizer,
    pub pages: reqwest::Client,
    pub prober: reqwest::Client,
}

impl JobContext {
    pub fn new(config: Config) -> Result<Self> {
        let store = Store::new(&config).context("failed to initialize store client")?;
        let summarizer =
            Summarizer::new(config.ai.clone()).context("failed to initialize AI gateway")?;
        let pages = scrapers::page_client(&config).context("failed to build page client")?;
        let prober = health::probe_client(&config).context("failed to build probe client")?;
        Ok(Self {
            config,
            store,
            summarizer,
            pages,
            prober,
        })
    }

    fn crawl_delay(&self) -> Duration {
        Duration::from_secs(self.config.crawl_delay_secs)
    }
}

/// The jobs the scheduler and CLI know by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    IngestNews,
    CheckWebsites,
    IngestAccounts,
    GenerateSummaries,
    CleanupDuplicates,
    RemoveInactive,
    FullUpdate,
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::IngestNews => "ingest-news",
            Job::CheckWebsites => "check-websites",
            Job::IngestAccounts => "ingest-social-accounts",
            Job::GenerateSummaries => "generate-summaries",
            Job::CleanupDuplicates => "cleanup-duplicates",
            Job::RemoveInactive => "remove-known-inactive",
            Job::FullUpdate => "full-update",
        }
    }
}

/// Counts removed by one cleanup pass.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub news: usize,
    pub websites: usize,
    pub wechat: usize,
}

/// Ingest all configured news sources sequentially. Returns saved counts
/// per source; a failing source contributes zero, gets exactly one audit
/// error row, and never stops the others.
#[instrument(level = "info", skip_all)]
pub async fn ingest_news(ctx: &JobContext) -> Result<BTreeMap<String, usize>> {
    info!("Starting news scraping for all sources");
    let mut lookback = LookbackIndex::load(
        &ctx.store,
        ctx.config.duplicate_threshold_days,
        ctx.config.title_match,
    )
    .await?;
    info!(titles = lookback.len(), "Lookback set ready for deduplication");

    let mut results = BTreeMap::new();
    for source in &ctx.config.sources {
        let name = source.name().to_string();
        info!(source = %name, "Scraping news source");

        let fetched = scrapers::fetch_candidates(&ctx.pages, source, &lookback, &ctx.config).await;
        match fetched {
            Ok(candidates) => {
                let mut saved = 0usize;
                for candidate in candidates {
                    if save_candidate(ctx, &mut lookback, source.content_selector(), candidate)
                        .await
                    {
                        saved += 1;
                    }
                }
                info!(source = %name, saved, "Source pass finished");
                results.insert(name, saved);
            }
            Err(e) => {
                error!(source = %name, error = %e, "Source scrape failed");
                ctx.store
                    .append_crawl_log(&NewCrawlLog::error(&name, e.to_string()))
                    .await;
                results.insert(name, 0);
            }
        }

        sleep(ctx.crawl_delay()).await;
    }

    let total: usize = results.values().sum();
    let breakdown = results
        .iter()
        .map(|(source, count)| format!("{source}: {count}"))
        .join(", ");
    info!(total, "News scraping completed");
    ctx.store
        .append_crawl_log(&NewCrawlLog::success(
            "news_scraper",
            format!("Successfully scraped {total} news items ({breakdown})"),
            total as i64,
        ))
        .await;
    Ok(results)
}

/// Run one candidate through dedup, content extraction, validation and
/// insert. Returns whether a row was persisted.
async fn save_candidate(
    ctx: &JobContext,
    lookback: &mut LookbackIndex,
    content_hint: Option<&str>,
    candidate: Candidate,
) -> bool {
    let decision = dedup::check_article(&ctx.store, lookback, &candidate.title, &candidate.url).await;
    match decision {
        Ok(Decision::Fresh) => {}
        Ok(Decision::Existing(id)) => {
            info!(title = %candidate.title, id, "Article already stored");
            lookback.remember(&candidate.title, &candidate.url);
            return false;
        }
        Ok(Decision::SkipSimilar) => {
            info!(title = %candidate.title, "Similar article within lookback window; skipped");
            return false;
        }
        Err(e) => {
            warn!(title = %candidate.title, error = %e, "Dedup check failed; skipping candidate");
            return false;
        }
    }

    let body = content::fetch_full_text(&ctx.pages, &candidate.url, content_hint).await;
    let mut article = NewArticle::from_candidate(candidate, body);
    if article.summary.is_none() {
        if let Some(body) = &article.content {
            article.summary = Some(extract_summary(body, SUMMARY_MAX_CHARS));
        }
    }

    if !article.is_valid() {
        return false;
    }

    match ctx.store.insert_news(&article).await {
        Ok(row) => {
            info!(title = %article.title, id = %row.id, "News saved");
            lookback.remember(&article.title, &article.original_url);
            true
        }
        Err(e) => {
            warn!(title = %article.title, error = %e, "Failed to save news");
            false
        }
    }
}

/// Probe the website directory and record every outcome.
#[instrument(level = "info", skip_all)]
pub async fn check_websites(ctx: &JobContext) -> Result<CheckReport> {
    let report = health::check_all_websites(&ctx.store, &ctx.prober, ctx.crawl_delay()).await?;
    ctx.store
        .append_crawl_log(&NewCrawlLog::success(
            "website_checker",
            format!(
                "Checked {} websites. Available: {}, Unavailable: {}",
                report.total_checked, report.available, report.unavailable
            ),
            report.total_checked as i64,
        ))
        .await;
    Ok(report)
}

/// Scrape the member directory and persist unseen WeChat accounts.
#[instrument(level = "info", skip_all)]
pub async fn ingest_accounts(ctx: &JobContext) -> Result<usize> {
    let candidates = accounts::fetch_member_accounts(&ctx.pages).await?;

    let mut saved = 0usize;
    for account in candidates {
        match dedup::check_wechat(&ctx.store, &account.name, Some(&account.wechat_id)).await {
            Ok(Some(_)) => {
                info!(name = %account.name, "WeChat account already exists");
            }
            Ok(None) => match ctx.store.insert_wechat(&account).await {
                Ok(_) => {
                    saved += 1;
                    info!(name = %account.name, "WeChat account saved");
                }
                Err(e) => {
                    warn!(name = %account.name, error = %e, "Failed to save WeChat account");
                }
            },
            Err(e) => {
                warn!(name = %account.name, error = %e, "WeChat dedup check failed; skipping");
            }
        }
    }

    info!(saved, "WeChat account ingest completed");
    ctx.store
        .append_crawl_log(&NewCrawlLog::success(
            "iccircle_scraper",
            format!("Saved {saved} WeChat accounts"),
            saved as i64,
        ))
        .await;
    Ok(saved)
}

/// Summarize a page of unprocessed articles. A failure on one article
/// never blocks the rest of the batch; only successes are persisted.
#[instrument(level = "info", skip_all)]
pub async fn generate_summaries(ctx: &JobContext) -> Result<usize> {
    if !ctx.summarizer.is_enabled() {
        info!("No AI providers configured; skipping summary generation");
        return Ok(0);
    }

    let pending = ctx.store.pending_ai_news(ctx.config.ai.batch_size).await?;
    if pending.is_empty() {
        info!("No news items need AI summary processing");
        return Ok(0);
    }
    info!(count = pending.len(), "Generating AI summaries");

    let mut processed = 0usize;
    for item in &pending {
        if let Some(digest) = ctx
            .summarizer
            .summarize(&item.title, item.body_for_ai(), &item.source)
            .await
        {
            match ctx
                .store
                .mark_news_summarized(&item.id, &digest.summary, &digest.keywords)
                .await
            {
                Ok(true) => {
                    processed += 1;
                    info!(title = %item.title, "AI summary stored");
                }
                Ok(false) => {
                    warn!(id = %item.id, "Article vanished before AI summary could be stored");
                }
                Err(e) => {
                    warn!(id = %item.id, error = %e, "Failed to store AI summary");
                }
            }
        }

        // Fixed pause between provider calls to respect rate limits.
        sleep(Duration::from_secs(ctx.config.ai.call_delay_secs)).await;
    }

    info!(processed, "AI summary batch completed");
    ctx.store
        .append_crawl_log(&NewCrawlLog::success(
            "ai_summarizer",
            format!("Processed AI summaries for {processed} news items"),
            processed as i64,
        ))
        .await;
    Ok(processed)
}

/// Post-hoc duplicate cleanup across news, websites and WeChat accounts.
#[instrument(level = "info", skip_all)]
pub async fn cleanup_duplicates(ctx: &JobContext) -> Result<CleanupReport> {
    log_table_stats(ctx, "before cleanup").await;

    let report = CleanupReport {
        news: dedup::cleanup_duplicate_news(&ctx.store).await?,
        websites: dedup::cleanup_duplicate_websites(&ctx.store).await?,
        wechat: dedup::cleanup_duplicate_wechat(&ctx.store).await?,
    };

    log_table_stats(ctx, "after cleanup").await;
    let total = report.news + report.websites + report.wechat;
    info!(
        news = report.news,
        websites = report.websites,
        wechat = report.wechat,
        "Cleanup completed"
    );
    ctx.store
        .append_crawl_log(&NewCrawlLog::success(
            "cleanup",
            format!(
                "Removed {} duplicate news, {} duplicate websites, {} duplicate WeChat accounts",
                report.news, report.websites, report.wechat
            ),
            total as i64,
        ))
        .await;
    Ok(report)
}

/// Delete directory entries the health checker has marked inactive.
#[instrument(level = "info", skip_all)]
pub async fn remove_inactive(ctx: &JobContext) -> Result<usize> {
    log_table_stats(ctx, "before removal").await;
    let deleted = ctx.store.delete_inactive_websites().await?;
    log_table_stats(ctx, "after removal").await;

    info!(deleted, "Inactive website removal completed");
    ctx.store
        .append_crawl_log(&NewCrawlLog::success(
            "remove_inactive",
            format!("Deleted {deleted} inactive websites"),
            deleted as i64,
        ))
        .await;
    Ok(deleted)
}

/// The full-update composite: cleanup → news → accounts → summaries →
/// health check, in that order, with a short pause between stages. Unlike
/// per-item isolation inside jobs, a failing stage aborts the composite
/// and surfaces its error.
#[instrument(level = "info", skip_all)]
pub async fn full_update(ctx: &JobContext) -> Result<()> {
    info!("Step 1: Cleaning duplicate data");
    cleanup_duplicates(ctx).await.context("cleanup stage failed")?;
    sleep(STAGE_PAUSE).await;

    info!("Step 2: Fetching latest news");
    ingest_news(ctx).await.context("news ingest stage failed")?;
    sleep(STAGE_PAUSE).await;

    info!("Step 3: Fetching WeChat accounts");
    ingest_accounts(ctx)
        .await
        .context("account ingest stage failed")?;
    sleep(STAGE_PAUSE).await;

    info!("Step 4: Generating AI summaries");
    generate_summaries(ctx)
        .await
        .context("summary stage failed")?;
    sleep(STAGE_PAUSE).await;

    info!("Step 5: Checking website status");
    check_websites(ctx).await.context("health check stage failed")?;

    info!("Complete data update finished");
    Ok(())
}

/// Run one job by name (the scheduler's dispatch path).
pub async fn run(ctx: &JobContext, job: Job) -> Result<()> {
    match job {
        Job::IngestNews => {
            ingest_news(ctx).await?;
        }
        Job::CheckWebsites => {
            check_websites(ctx).await?;
        }
        Job::IngestAccounts => {
            ingest_accounts(ctx).await?;
        }
        Job::GenerateSummaries => {
            generate_summaries(ctx).await?;
        }
        Job::CleanupDuplicates => {
            cleanup_duplicates(ctx).await?;
        }
        Job::RemoveInactive => {
            remove_inactive(ctx).await?;
        }
        Job::FullUpdate => {
            full_update(ctx).await?;
        }
    }
    Ok(())
}

/// Run a job absorbing any failure: log it, write an audit error row, and
/// return — one job's crash must never reach its neighbours or take the
/// scheduler down.
pub async fn run_isolated(ctx: &JobContext, job: Job) {
    info!(job = job.name(), "Job starting");
    match run(ctx, job).await {
        Ok(()) => info!(job = job.name(), "Job completed"),
        Err(e) => {
            error!(job = job.name(), error = %e, "Job failed");
            ctx.store
                .append_crawl_log(&NewCrawlLog::error(job.name(), e.to_string()))
                .await;
        }
    }
}

/// Add one website to the directory, deduplicated by normalized URL and
/// fuzzy name. Returns whether a new row was created.
pub async fn add_website(
    ctx: &JobContext,
    name: &str,
    url: &str,
    description: Option<String>,
) -> Result<bool> {
    let url = normalize_url(url, None);
    if let Some(existing) = dedup::check_website(&ctx.store, name, &url).await? {
        info!(name, id = %existing, "Website already in directory");
        return Ok(false);
    }

    let row = ctx
        .store
        .insert_website(&NewWebsite {
            name: name.trim().to_string(),
            url,
            description,
            category_id: None,
            is_active: true,
            created_at: chrono::Utc::now(),
        })
        .await?;
    info!(name, id = %row.id, "Website saved");
    Ok(true)
}

/// Connectivity check plus per-table counts.
pub async fn show_status(ctx: &JobContext) -> Result<()> {
    let categories = ctx.store.table_count("categories").await?;
    info!(categories, "Database connected");

    for table in ["categories", "websites", "news", "wechat_accounts"] {
        match ctx.store.table_count(table).await {
            Ok(count) => info!(table, count, "Table stats"),
            Err(e) => warn!(table, error = %e, "Failed to count table"),
        }
    }

    let recent = ctx.store.recent_news_titles(1).await?;
    info!(count = recent.len(), "News in the last 24 hours");

    let monitored = ctx.store.websites_for_check().await?;
    info!(count = monitored.len(), "Websites to monitor");
    Ok(())
}

async fn log_table_stats(ctx: &JobContext, label: &str) {
    for table in ["news", "websites", "wechat_accounts"] {
        match ctx.store.table_count(table).await {
            Ok(count) => info!(table, count, stage = label, "Table stats"),
            Err(e) => warn!(table, error = %e, "Failed to count table"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_names_match_cli_surface() {
        assert_eq!(Job::IngestNews.name(), "ingest-news");
        assert_eq!(Job::CheckWebsites.name(), "check-websites");
        assert_eq!(Job::IngestAccounts.name(), "ingest-social-accounts");
        assert_eq!(Job::GenerateSummaries.name(), "generate-summaries");
        assert_eq!(Job::CleanupDuplicates.name(), "cleanup-duplicates");
        assert_eq!(Job::RemoveInactive.name(), "remove-known-inactive");
        assert_eq!(Job::FullUpdate.name(), "full-update");
    }
}
