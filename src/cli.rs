//! Command-line interface definitions for Trabalhista News.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! All arguments can be provided via command-line flags or environment variables.

use clap::Parser;
use std::time::Duration;

use crate::fetch::FetchSettings;
use crate::outputs::message::DEFAULT_CHUNK_LIMIT;
use crate::pipeline::RunLimits;
use crate::scrapers::article::DEFAULT_MIN_BODY_LEN;

/// Command-line arguments for the Trabalhista News application.
///
/// # Examples
///
/// ```sh
/// # Normal scheduled run
/// TELEGRAM_TOKEN=... TELEGRAM_CHAT_ID=... trabalhista_news
///
/// # Print the digest instead of sending it, and keep history untouched
/// trabalhista_news --dry-run --max-results 5
///
/// # Summarize with an OpenAI-compatible endpoint and keep a JSON report
/// trabalhista_news --openai-api-key sk-... -j ./reports
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_TOKEN", hide_env_values = true)]
    pub telegram_token: Option<String>,

    /// Telegram chat id that receives the digest
    #[arg(long, env = "TELEGRAM_CHAT_ID", allow_hyphen_values = true)]
    pub telegram_chat_id: Option<String>,

    /// API key for the summarizer; summaries are skipped without one
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Summarizer model name
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Optional path to config.yaml file
    #[arg(short, long, env = "TRABALHISTA_CONFIG")]
    pub config: Option<String>,

    /// JSON file holding every already-processed URL
    #[arg(long, env = "HISTORY_FILE", default_value = ".github/enviadas.json")]
    pub history_file: String,

    /// Links kept per source page
    #[arg(long, env = "MAX_LINKS_PER_SOURCE", default_value_t = 30)]
    pub max_links_per_source: usize,

    /// Article pages fetched per run, across all sources
    #[arg(long, env = "MAX_PAGES", default_value_t = 120)]
    pub max_pages: usize,

    /// Accepted results per run
    #[arg(long, env = "MAX_RESULTS", default_value_t = 15)]
    pub max_results: usize,

    /// Minimum body length (characters) for a page to count as an article
    #[arg(long, env = "MIN_BODY_LEN", default_value_t = DEFAULT_MIN_BODY_LEN)]
    pub min_body_len: usize,

    /// Strict relevance threshold (score >= 2)
    #[arg(long, env = "STRICT", default_value_t = true, action = clap::ArgAction::Set)]
    pub strict: bool,

    /// Sources crawled concurrently
    #[arg(long, env = "WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// Delay before every HTTP request, in milliseconds
    #[arg(long, env = "DELAY_MS", default_value_t = 1000)]
    pub delay_ms: u64,

    /// Per-request timeout, in seconds
    #[arg(long, env = "TIMEOUT_SECS", default_value_t = 20)]
    pub timeout_secs: u64,

    /// Maximum characters per outgoing message part
    #[arg(long, env = "CHUNK_LIMIT", default_value_t = DEFAULT_CHUNK_LIMIT)]
    pub chunk_limit: usize,

    /// Output directory for the JSON run report
    #[arg(short, long, env = "JSON_OUTPUT_DIR")]
    pub json_output_dir: Option<String>,

    /// Print the digest to stdout and leave the history file untouched
    #[arg(long, env = "DRY_RUN")]
    pub dry_run: bool,
}

impl Cli {
    pub fn limits(&self) -> RunLimits {
        RunLimits {
            max_links_per_source: self.max_links_per_source,
            max_pages: self.max_pages,
            max_results: self.max_results,
            workers: self.workers.max(1),
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            politeness_delay: Duration::from_millis(self.delay_ms),
            ..FetchSettings::default()
        }
    }

    /// Token and chat id, when both are present and non-blank.
    pub fn telegram_credentials(&self) -> Option<(&str, &str)> {
        let token = self.telegram_token.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        let chat = self.telegram_chat_id.as_deref().map(str::trim).filter(|c| !c.is_empty())?;
        Some((token, chat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["trabalhista_news"]);

        assert_eq!(cli.history_file, ".github/enviadas.json");
        assert_eq!(cli.limits(), RunLimits::default());
        assert_eq!(cli.min_body_len, 250);
        assert_eq!(cli.chunk_limit, 3800);
        assert!(cli.strict);
        assert!(!cli.dry_run);
        assert_eq!(cli.fetch_settings().timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from([
            "trabalhista_news",
            "--dry-run",
            "--strict",
            "false",
            "--max-results",
            "5",
            "--workers",
            "0",
            "--delay-ms",
            "10",
            "-j",
            "/tmp/json",
        ]);

        assert!(cli.dry_run);
        assert!(!cli.strict);
        assert_eq!(cli.limits().max_results, 5);
        assert_eq!(cli.limits().workers, 1);
        assert_eq!(cli.fetch_settings().politeness_delay, Duration::from_millis(10));
        assert_eq!(cli.json_output_dir.as_deref(), Some("/tmp/json"));
    }

    #[test]
    fn test_blank_credentials_are_missing() {
        let cli = Cli::parse_from([
            "trabalhista_news",
            "--telegram-token",
            "  ",
            "--telegram-chat-id=-100",
        ]);
        assert!(cli.telegram_credentials().is_none());

        let cli = Cli::parse_from([
            "trabalhista_news",
            "--telegram-token",
            "123:abc",
            "--telegram-chat-id=-100",
        ]);
        assert_eq!(cli.telegram_credentials(), Some(("123:abc", "-100")));
    }
}
