//! Cooperative job scheduler.
//!
//! A single timer loop checks once a minute which jobs are due and runs
//! them one at a time — a due job finishes before the next one is even
//! considered, and a failed job is logged and isolated by
//! [`jobs::run_isolated`] rather than crashing the loop. An interrupt
//! stops the loop cleanly between ticks; rows the current job already
//! persisted stay persisted.

use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::time::sleep;
use tracing::info;

use crate::config::ScheduleConfig;
use crate::jobs::{self, Job, JobContext};

const TICK: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct ScheduledJob {
    job: Job,
    interval: Duration,
    next_due: Instant,
}

pub struct Scheduler {
    entries: Vec<ScheduledJob>,
}

impl Scheduler {
    pub fn from_config(schedule: &ScheduleConfig) -> Self {
        let hours = |h: u64| Duration::from_secs(h * 3600);
        let intervals = [
            (Job::IngestNews, hours(schedule.news_interval_hours)),
            (Job::CheckWebsites, hours(schedule.websites_interval_hours)),
            (Job::IngestAccounts, hours(schedule.accounts_interval_hours)),
            (Job::GenerateSummaries, hours(schedule.summaries_interval_hours)),
            (Job::CleanupDuplicates, hours(schedule.cleanup_interval_hours)),
        ];

        let now = Instant::now();
        let entries = intervals
            .into_iter()
            .map(|(job, interval)| ScheduledJob {
                job,
                interval,
                next_due: now + interval,
            })
            .collect();
        Self { entries }
    }

    /// Run the timer loop until an interrupt arrives.
    pub async fn run(mut self, ctx: &JobContext) -> Result<()> {
        for entry in &self.entries {
            info!(
                job = entry.job.name(),
                interval_hours = entry.interval.as_secs() / 3600,
                "Job scheduled"
            );
        }

        // Initial ingest pass so a fresh deployment has data right away.
        jobs::run_isolated(ctx, Job::IngestNews).await;

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Interrupt received; stopping scheduler");
                    return Ok(());
                }
                _ = sleep(TICK) => {}
            }

            let now = Instant::now();
            for entry in &mut self.entries {
                if now >= entry.next_due {
                    jobs::run_isolated(ctx, entry.job).await;
                    entry.next_due = Instant::now() + entry.interval;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> ScheduleConfig {
        ScheduleConfig {
            news_interval_hours: 4,
            websites_interval_hours: 24,
            accounts_interval_hours: 168,
            summaries_interval_hours: 24,
            cleanup_interval_hours: 24,
        }
    }

    #[test]
    fn test_all_jobs_scheduled_with_configured_intervals() {
        let scheduler = Scheduler::from_config(&schedule());
        assert_eq!(scheduler.entries.len(), 5);

        let news = scheduler
            .entries
            .iter()
            .find(|e| e.job == Job::IngestNews)
            .unwrap();
        assert_eq!(news.interval, Duration::from_secs(4 * 3600));

        let accounts = scheduler
            .entries
            .iter()
            .find(|e| e.job == Job::IngestAccounts)
            .unwrap();
        assert_eq!(accounts.interval, Duration::from_secs(168 * 3600));
    }

    #[test]
    fn test_nothing_due_immediately() {
        let scheduler = Scheduler::from_config(&schedule());
        let now = Instant::now();
        assert!(scheduler.entries.iter().all(|e| e.next_due > now));
    }
}
