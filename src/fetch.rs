//! Polite, retrying HTTP GET.
//!
//! Every request waits a fixed politeness delay first. A transient failure
//! (timeout, connection error, 5xx) is retried exactly once after a backoff;
//! a 4xx is final. Whatever the final outcome, the caller sees a body or a
//! single [`FetchError`].

use async_trait::async_trait;
use rand::{Rng, rng};
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::FetchError;

/// One initial attempt plus one retry.
const MAX_ATTEMPTS: u32 = 2;

/// Source of page bodies. The pipeline only ever talks to this trait.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError>;
}

/// Timeouts and pacing for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Slept before every request, retries included.
    pub politeness_delay: Duration,
    /// Base of the retry backoff; doubles with every attempt.
    pub retry_backoff: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            user_agent: concat!(
                "Mozilla/5.0 (compatible; trabalhista_news/",
                env!("CARGO_PKG_VERSION"),
                ")"
            )
            .to_string(),
            timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
            politeness_delay: Duration::from_millis(1000),
            retry_backoff: Duration::from_millis(1500),
        }
    }
}

/// Backoff before retry number `attempt + 1`: `base * 2^attempt`, plus up to
/// 250ms of jitter. Strictly increasing in `attempt`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let jitter_ms: u64 = rng().random_range(0..=250);
    base.saturating_mul(1 << attempt.min(16)) + Duration::from_millis(jitter_ms)
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    settings: FetchSettings,
}

impl HttpFetcher {
    pub fn new(settings: FetchSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .build()?;
        Ok(Self { client, settings })
    }

    async fn attempt(&self, url: &Url) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify(&e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        response.text().await.map_err(|e| classify(&e))
    }
}

fn classify(e: &reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if let Some(status) = e.status() {
        FetchError::HttpStatus(status.as_u16())
    } else {
        FetchError::Network(e.to_string())
    }
}

/// Politeness delay before every attempt, one retry after a backoff when the
/// first failure is transient. `attempt` performs a single request.
pub async fn with_retry<F, Fut>(settings: &FetchSettings, mut attempt: F) -> Result<String, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, FetchError>>,
{
    let t0 = Instant::now();
    let mut tries = 0u32;
    loop {
        sleep(settings.politeness_delay).await;
        match attempt().await {
            Ok(body) => {
                debug!(
                    bytes = body.len(),
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "Fetched page"
                );
                return Ok(body);
            }
            Err(e) if e.is_transient() && tries + 1 < MAX_ATTEMPTS => {
                let delay = backoff_delay(settings.retry_backoff, tries);
                warn!(attempt = tries, ?delay, error = %e, "Fetch failed; backing off");
                sleep(delay).await;
                tries += 1;
            }
            Err(e) => {
                debug!(attempt = tries, error = %e, "Fetch failed for good");
                return Err(e);
            }
        }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        with_retry(&self.settings, || self.attempt(url)).await
    }
}

#[cfg(test)]
pub mod testing {
    //! In-memory [`Fetch`] double for pipeline tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub struct StaticFetcher {
        pages: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    impl StaticFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(mut self, url: &str, html: impl Into<String>) -> Self {
            self.pages.insert(url.to_string(), html.into());
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetch for StaticFetcher {
        async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            self.pages
                .get(url.as_str())
                .cloned()
                .ok_or(FetchError::HttpStatus(404))
        }
    }
}
