//! Command-line interface definitions.
//!
//! Subcommands map one-to-one onto the pipeline jobs; the log level and
//! the optional source-table override can also come from the
//! environment.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the IC123 crawler.
///
/// # Examples
///
/// ```sh
/// ic123_crawler news                 # run news scraping once
/// ic123_crawler websites             # probe the website directory once
/// ic123_crawler update               # full update cycle
/// ic123_crawler schedule             # start the timer loop
/// ic123_crawler --log-level debug news
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides it
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// YAML file overriding the built-in news source table
    #[arg(long, env = "NEWS_SOURCES_FILE")]
    pub sources: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run news scraping once
    News,
    /// Check every directory website once
    Websites,
    /// Scrape IC Circle WeChat accounts
    Accounts,
    /// Generate AI summaries for unprocessed news
    AiSummary,
    /// Clean duplicate data across all tables
    Cleanup,
    /// Remove websites already marked inactive
    RemoveInactive,
    /// Complete update: cleanup, scraping, summaries, health checks
    Update,
    /// Start the scheduled crawler
    Schedule,
    /// Show system status
    Status,
    /// Add one website to the directory (deduplicated by URL and name)
    AddWebsite {
        /// Display name of the website
        name: String,
        /// Website URL
        url: String,
        /// Short description shown in the directory
        #[arg(long)]
        description: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::parse_from(["ic123_crawler", "news"]);
        assert_eq!(cli.command, Command::News);
        assert_eq!(cli.log_level, "info");
        assert!(cli.sources.is_none());

        let cli = Cli::parse_from(["ic123_crawler", "ai-summary"]);
        assert_eq!(cli.command, Command::AiSummary);

        let cli = Cli::parse_from(["ic123_crawler", "remove-inactive"]);
        assert_eq!(cli.command, Command::RemoveInactive);
    }

    #[test]
    fn test_cli_log_level_flag() {
        let cli = Cli::parse_from(["ic123_crawler", "--log-level", "debug", "status"]);
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.command, Command::Status);
    }

    #[test]
    fn test_cli_sources_flag() {
        let cli = Cli::parse_from(["ic123_crawler", "--sources", "sources.yaml", "news"]);
        assert_eq!(cli.sources.unwrap(), PathBuf::from("sources.yaml"));
    }

    #[test]
    fn test_cli_add_website_args() {
        let cli = Cli::parse_from([
            "ic123_crawler",
            "add-website",
            "SemiWiki",
            "https://www.semiwiki.com/",
            "--description",
            "半导体行业社区",
        ]);
        match cli.command {
            Command::AddWebsite {
                name,
                url,
                description,
            } => {
                assert_eq!(name, "SemiWiki");
                assert_eq!(url, "https://www.semiwiki.com/");
                assert_eq!(description.as_deref(), Some("半导体行业社区"));
            }
            other => panic!("expected add-website, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["ic123_crawler", "frobnicate"]).is_err());
    }
}
