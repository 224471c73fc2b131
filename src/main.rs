//! # IC123 Crawler
//!
//! A periodic ingestion pipeline for the IC industry: scrapes articles
//! from a fixed set of news sources, verifies the liveness of a curated
//! website directory, and enriches stored articles with AI-generated
//! summaries.
//!
//! ## Architecture
//!
//! 1. **Source adapters** fetch raw feed/listing data per source
//! 2. **Normalizer + dedup engine** filter candidates against the store
//!    and a lookback window
//! 3. **Content extractor** recovers full body text where possible
//! 4. Surviving items are persisted to the record store
//! 5. A separate job pushes unsummarized articles through the **AI
//!    gateway** and patches the results back
//! 6. The **health checker** probes the website directory independently
//!
//! Jobs run on demand via subcommands or on fixed intervals via
//! `schedule`; each job is isolated, audited in `crawl_logs`, and
//! processes items sequentially with politeness delays.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod ai;
mod cli;
mod config;
mod dedup;
mod health;
mod jobs;
mod models;
mod scheduler;
mod scrapers;
mod store;
mod text;

use cli::{Cli, Command};
use config::Config;
use jobs::JobContext;
use scheduler::Scheduler;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start = std::time::Instant::now();
    info!(command = ?args.command, "IC123 crawler starting");

    match run(args).await {
        Ok(()) => {
            info!(elapsed = ?start.elapsed(), "Operation completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Operation failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> anyhow::Result<()> {
    let config = Config::from_env(args.sources.as_deref())?;
    let ctx = JobContext::new(config)?;

    // The scheduler owns interrupt handling itself; for one-shot commands
    // an interrupt simply ends the run cleanly (exit code 0).
    if args.command == Command::Schedule {
        return Scheduler::from_config(&ctx.config.schedule).run(&ctx).await;
    }

    tokio::select! {
        result = run_command(&ctx, args.command) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Operation interrupted by user");
            Ok(())
        }
    }
}

async fn run_command(ctx: &JobContext, command: Command) -> anyhow::Result<()> {
    match command {
        Command::News => {
            let results = jobs::ingest_news(ctx).await?;
            let total: usize = results.values().sum();
            info!("News scraping results:");
            for (source, count) in &results {
                info!(source = %source, count, "Source result");
            }
            info!(total, "News scraping completed");
        }
        Command::Websites => {
            let report = jobs::check_websites(ctx).await?;
            info!(
                total = report.total_checked,
                available = report.available,
                unavailable = report.unavailable,
                "Website checking results"
            );
            for (website, note) in &report.errors {
                warn!(website = %website, note = %note, "Website unavailable");
            }
        }
        Command::Accounts => {
            let saved = jobs::ingest_accounts(ctx).await?;
            info!(saved, "WeChat account scraping completed");
        }
        Command::AiSummary => {
            let processed = jobs::generate_summaries(ctx).await?;
            info!(processed, "AI summary generation completed");
        }
        Command::Cleanup => {
            let report = jobs::cleanup_duplicates(ctx).await?;
            info!(
                news = report.news,
                websites = report.websites,
                wechat = report.wechat,
                "Cleanup results"
            );
        }
        Command::RemoveInactive => {
            let deleted = jobs::remove_inactive(ctx).await?;
            info!(deleted, "Inactive website removal completed");
        }
        Command::Update => jobs::full_update(ctx).await?,
        Command::Status => jobs::show_status(ctx).await?,
        Command::AddWebsite {
            name,
            url,
            description,
        } => {
            let created = jobs::add_website(ctx, &name, &url, description).await?;
            info!(created, "Website add completed");
        }
        Command::Schedule => unreachable!("schedule is handled before dispatch"),
    }
    Ok(())
}
