//! Outbound delivery of the digest.
//!
//! The pipeline hands over already formatted, already chunked text; a
//! [`Publish`] implementation only has to push one part somewhere.
//!
//! | Publisher | Used when |
//! |-----------|-----------|
//! | [`TelegramPublisher`] | normal runs (`TELEGRAM_TOKEN` + `TELEGRAM_CHAT_ID`) |
//! | [`StdoutPublisher`] | `--dry-run` |

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{error, info, instrument};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// `publish(text) -> ok/fail`.
#[async_trait]
pub trait Publish: Send + Sync {
    async fn publish(&self, text: &str) -> Result<()>;
}

/// Sends HTML-formatted messages through the Telegram Bot API.
pub struct TelegramPublisher {
    client: Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramPublisher {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(20)).build()?,
            api_base: TELEGRAM_API.to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }
}

#[async_trait]
impl Publish for TelegramPublisher {
    #[instrument(level = "info", skip_all, fields(chars = text.chars().count()))]
    async fn publish(&self, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        self.client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .context("telegram sendMessage")?
            .error_for_status()
            .context("telegram non-2xx")?;
        Ok(())
    }
}

/// Prints every part to stdout; nothing leaves the machine.
#[derive(Debug, Default)]
pub struct StdoutPublisher;

#[async_trait]
impl Publish for StdoutPublisher {
    async fn publish(&self, text: &str) -> Result<()> {
        println!("{text}");
        Ok(())
    }
}

/// How many parts made it out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub sent: usize,
    pub failed: usize,
}

impl Delivery {
    pub fn any_sent(&self) -> bool {
        self.sent > 0
    }
}

/// Deliver every part in order. A failed part is logged and skipped; the
/// remaining parts are still attempted.
pub async fn deliver(publisher: &dyn Publish, parts: &[String]) -> Delivery {
    let mut delivery = Delivery::default();
    for (index, part) in parts.iter().enumerate() {
        match publisher.publish(part).await {
            Ok(()) => {
                delivery.sent += 1;
                info!(part = index + 1, total = parts.len(), "Delivered message part");
            }
            Err(e) => {
                delivery.failed += 1;
                error!(part = index + 1, total = parts.len(), error = %e, "Message part delivery failed");
            }
        }
    }
    delivery
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        fail_on: Option<usize>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Publish for Recorder {
        async fn publish(&self, text: &str) -> Result<()> {
            let mut seen = self.seen.lock().unwrap();
            seen.push(text.to_string());
            if Some(seen.len()) == self.fail_on {
                return Err(anyhow!("HTTP 502"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_deliver_keeps_going_after_a_failed_part() {
        let recorder = Recorder {
            fail_on: Some(2),
            ..Default::default()
        };
        let parts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let delivery = deliver(&recorder, &parts).await;
        assert_eq!(delivery, Delivery { sent: 2, failed: 1 });
        assert_eq!(*recorder.seen.lock().unwrap(), parts);
    }

    #[tokio::test]
    async fn test_deliver_nothing() {
        let delivery = deliver(&StdoutPublisher, &[]).await;
        assert!(!delivery.any_sent());
    }

    #[test]
    fn test_telegram_endpoint() {
        let publisher = TelegramPublisher::new("123:abc", "-100200").unwrap();
        assert_eq!(
            publisher.endpoint(),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }
}
