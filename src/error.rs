//! Error taxonomy for the crawl pipeline.
//!
//! Per-link and per-source failures are values, not panics: the pipeline
//! logs them and moves on. Only startup problems (missing credentials,
//! unreadable configuration, a corrupt history file) end a run.

use std::path::PathBuf;
use thiserror::Error;

/// Why a single HTTP GET did not produce a body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("server answered with HTTP {0}")]
    HttpStatus(u16),
    #[error("network error: {0}")]
    Network(String),
}

impl FetchError {
    /// Timeouts, connection problems and 5xx answers are worth one more try.
    /// Any 4xx is final for that URL.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Network(_) => true,
            FetchError::HttpStatus(code) => *code >= 500,
        }
    }
}

/// Which domain-policy predicate turned a URL away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PolicyRejection {
    #[error("blocked host or path")]
    Blocked,
    #[error("outside the source's scope")]
    OutOfScope,
    #[error("does not look like an article")]
    NotArticle,
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("malformed URL {raw:?}: {reason}")]
    MalformedUrl { raw: String, reason: String },
    #[error("fetch failed: {0}")]
    FetchFailed(#[from] FetchError),
    #[error("no usable content (title empty or body has {body_len} chars)")]
    EmptyContent { body_len: usize },
    #[error("rejected by domain policy: {0}")]
    PolicyRejected(#[from] PolicyRejection),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("history file {path:?} is not a JSON array of URLs: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
