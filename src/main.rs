//! # Trabalhista News
//!
//! Watches Mato Grosso news sources for coverage of the labor courts
//! (Justiça do Trabalho, TRT-23) and delivers each new matching article to a
//! Telegram chat exactly once.
//!
//! ## Usage
//!
//! ```sh
//! TELEGRAM_TOKEN=... TELEGRAM_CHAT_ID=... trabalhista_news
//! trabalhista_news --dry-run
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Discovery**: fetch each source's seed page and keep in-scope article links
//! 2. **Extraction**: fetch each new link and pull out title and body
//! 3. **Classification**: keyword relevance, then an optional LLM summary/veto
//! 4. **Delivery**: one HTML digest, split into Telegram-sized parts
//! 5. **History**: every classified URL is persisted so it is never seen twice

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod classifier;
mod cli;
mod config;
mod error;
mod fetch;
mod history;
mod models;
mod outputs;
mod pipeline;
mod policy;
mod publish;
mod scrapers;
mod urls;
mod utils;

use api::{ChatCompletionClient, summarizer};
use classifier::Classifier;
use cli::Cli;
use config::AppConfig;
use fetch::HttpFetcher;
use history::HistoryStore;
use outputs::json::{RunReport, write_report};
use outputs::message::{render_digest, split_message};
use pipeline::Pipeline;
use policy::DomainPolicy;
use publish::{Publish, StdoutPublisher, TelegramPublisher, deliver};
use scrapers::article::{Extractor, SourceLabels};
use utils::{ensure_writable_dir, time_of_day};

#[tokio::main]
#[instrument]
async fn main() -> Result<()> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("trabalhista_news starting up");

    let args = Cli::parse();
    debug!(?args.config, %args.history_file, dry_run = args.dry_run, "Parsed CLI arguments");

    // --- Publisher first: missing credentials must fail before any crawling ---
    let publisher: Box<dyn Publish> = if args.dry_run {
        info!("Dry run: digest goes to stdout, history is left untouched");
        Box::new(StdoutPublisher)
    } else {
        let Some((token, chat_id)) = args.telegram_credentials() else {
            error!("TELEGRAM_TOKEN and TELEGRAM_CHAT_ID are required unless --dry-run is set");
            bail!("missing Telegram credentials");
        };
        Box::new(TelegramPublisher::new(token, chat_id)?)
    };

    if let Some(dir) = &args.json_output_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(path = %dir, error = %e, "JSON output directory is not writable");
            bail!("JSON output directory {dir} is not writable: {e}");
        }
    }

    // --- Configuration and history ---
    let app_config = match &args.config {
        Some(path) => AppConfig::load(path).await?,
        None => AppConfig::default(),
    };
    let sources = app_config.sources()?;
    let keywords = app_config.keywords();

    let mut history = HistoryStore::load(&args.history_file)
        .await
        .context("history file is unreadable; refusing to start with an empty history")?;
    info!(known = history.len(), path = %history.path().display(), "History loaded");

    // --- Pipeline ---
    let fetcher = Arc::new(HttpFetcher::new(args.fetch_settings())?);
    let labels = SourceLabels::new(&sources, &app_config.labels);
    let mut pipeline = Pipeline::new(
        fetcher,
        DomainPolicy::for_sources(&sources),
        Extractor::new(labels, args.min_body_len),
        Classifier::new(&keywords, args.strict),
        args.limits(),
    );
    match args.openai_api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => {
            let client = ChatCompletionClient::new(
                &args.openai_base_url,
                key,
                &args.openai_model,
                Duration::from_secs(60),
            )?;
            pipeline = pipeline.with_summarizer(Arc::new(summarizer(client)));
            info!(model = %args.openai_model, "Summarizer enabled");
        }
        None => info!("No OPENAI_API_KEY; headlines fall back to article titles"),
    }

    let outcome = pipeline.run(&sources, &mut history).await;

    // --- Delivery ---
    let flush = if outcome.results.is_empty() {
        info!("Nothing new; no message sent");
        !args.dry_run
    } else {
        let digest = render_digest(&outcome.results, Local::now().date_naive());
        let parts = split_message(&digest, args.chunk_limit);
        info!(results = outcome.results.len(), parts = parts.len(), "Delivering digest");
        let delivery = deliver(publisher.as_ref(), &parts).await;
        if !delivery.any_sent() {
            error!(failed = delivery.failed, "No message part was delivered; history not updated");
        } else if delivery.failed > 0 {
            warn!(sent = delivery.sent, failed = delivery.failed, "Digest partially delivered");
        }
        !args.dry_run && delivery.any_sent()
    };

    if flush {
        history.flush().await?;
        info!(known = history.len(), "History saved");
    }

    // --- JSON report ---
    if let Some(dir) = &args.json_output_dir {
        let now = Local::now();
        let report = RunReport {
            local_date: now.date_naive().to_string(),
            time_of_day: time_of_day(),
            local_time: now.time().format("%H:%M:%S").to_string(),
            stats: &outcome.stats,
            results: &outcome.results,
        };
        if let Err(e) = write_report(&report, dir).await {
            error!(error = %e, "Failed to write JSON run report");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        accepted = outcome.stats.accepted,
        "Execution complete"
    );

    Ok(())
}
