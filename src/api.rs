//! LLM summarization with exponential backoff retry logic.
//!
//! Accepted articles can be condensed into a short headline by an
//! OpenAI-compatible chat-completions endpoint. The model may also answer
//! with the sentinel `DESCARTAR` (or `DISCARD`), which vetoes the article
//! even though the keyword classifier accepted it.
//!
//! # Architecture
//!
//! - [`AskAsync`]: core trait defining one async LLM round trip
//! - [`ChatCompletionClient`]: `reqwest` client for `/chat/completions`
//! - [`RetryAsk`]: decorator that adds retry logic to any `AskAsync` implementation
//! - [`Summarize`]: what the pipeline sees; implemented by `RetryAsk<T>`
//!
//! # Retry Strategy
//!
//! - Exponential backoff starting at `base_delay`
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use rand::{Rng, rng};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

use crate::utils::{truncate_chars, truncate_for_log};

/// Answers that veto an article.
pub const DISCARD_SENTINELS: &[&str] = &["DESCARTAR", "DISCARD"];

/// Article text sent to the model is cut to this many characters.
pub const MAX_INPUT_CHARS: usize = 4000;

const PROMPT: &str = "Você é um jornalista.
Resuma o texto abaixo em até 3 linhas, de forma clara e objetiva.
Se o texto não tratar de processos ou decisões da Justiça do Trabalho, responda apenas DESCARTAR.

Texto:
";

/// What the summarizer made of an article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Summary {
    Text(String),
    Discard,
}

impl Summary {
    /// Interpret a raw model answer. The sentinel check ignores case and
    /// surrounding whitespace or punctuation.
    pub fn from_response(raw: &str) -> Self {
        let trimmed = raw.trim();
        let bare = trimmed.trim_matches(|c: char| !c.is_alphanumeric());
        if DISCARD_SENTINELS
            .iter()
            .any(|sentinel| bare.eq_ignore_ascii_case(sentinel))
        {
            Summary::Discard
        } else {
            Summary::Text(trimmed.to_string())
        }
    }
}

/// Late-stage veto and headline source for accepted records.
#[async_trait]
pub trait Summarize: Send + Sync {
    async fn summarize(&self, text: &str) -> anyhow::Result<Summary>;
}

/// Trait for async LLM interaction.
///
/// Implementors of this trait can send text to an LLM and receive a response.
/// This abstraction allows for different LLM backends or decorators (like retry logic).
#[async_trait]
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send text to the LLM and receive a response.
    async fn ask(&self, text: &str) -> anyhow::Result<Self::Response>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryAsk<T> {
    /// The underlying LLM client to wrap.
    inner: T,
    /// Maximum number of retry attempts before giving up.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

#[async_trait]
impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync + Send + Sync,
    T::Response: Send,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> anyhow::Result<Self::Response> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(text).await {
                Ok(resp) => {
                    return Ok(resp);
                }
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    // backoff calc
                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1).min(16));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl<T> Summarize for RetryAsk<T>
where
    T: AskAsync<Response = String> + Send + Sync,
{
    async fn summarize(&self, text: &str) -> anyhow::Result<Summary> {
        let prompt = format!("{PROMPT}{}", truncate_chars(text, MAX_INPUT_CHARS));
        let answer = self.ask(&prompt).await?;
        debug!(answer = %truncate_for_log(&answer, 120), "Summarizer answered");
        Ok(Summary::from_response(&answer))
    }
}

/// Minimal client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl ChatCompletionClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: StdDuration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl AskAsync for ChatCompletionClient {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, text: &str) -> anyhow::Result<Self::Response> {
        let t0 = Instant::now();
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": text }],
            "temperature": 0.3,
        });

        let response: ChatResponse = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("chat completion request")?
            .error_for_status()
            .context("chat completion non-2xx")?
            .json()
            .await
            .context("chat completion body")?;

        debug!(elapsed_ms = t0.elapsed().as_millis() as u64, "Chat completion returned");
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| anyhow!("chat completion returned no content"))
    }
}

/// Build the retrying summarizer used by the pipeline.
pub fn summarizer(client: ChatCompletionClient) -> RetryAsk<ChatCompletionClient> {
    RetryAsk::new(client, 3, StdDuration::from_secs(1))
}
