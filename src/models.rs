//! Data models flowing through the crawl pipeline.
//!
//! This module defines the records handed from one stage to the next:
//! - [`Source`]: a seed page to crawl, plus its scope rules
//! - [`CandidateLink`]: a normalized URL discovered on a source page
//! - [`ArticleRecord`]: the title/body extracted from one article page
//! - [`RelevanceVerdict`]: the classifier's decision for one record
//! - [`ResultItem`]: an accepted record ready for the notifier

use serde::Serialize;
use url::Url;

use crate::policy::ArticleShape;

/// One site or section to crawl.
///
/// Sources are built once at startup from the built-in list or the YAML
/// configuration and never change during a run.
#[derive(Debug, Clone)]
pub struct Source {
    /// Short stable identifier (e.g. `"trt23"`).
    pub id: String,
    /// Human readable name used in notifications (e.g. `"TRT-23"`).
    pub label: String,
    /// The listing page the crawl starts from.
    pub seed: Url,
    /// Explicit host allow-list. Empty means "the seed host and its subdomains".
    pub allow_hosts: Vec<String>,
    /// Sibling properties that share a parent domain but are never in scope.
    pub exclude_hosts: Vec<String>,
    /// Per-source override of the article-shape heuristic for the seed host.
    pub article_shape: Option<ArticleShape>,
}

impl Source {
    /// Build a source with the default scope (seed host plus subdomains).
    pub fn new(id: impl Into<String>, label: impl Into<String>, seed: Url) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            seed,
            allow_hosts: Vec::new(),
            exclude_hosts: Vec::new(),
            article_shape: None,
        }
    }
}

/// A link found on a source page that passed normalization and domain policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLink {
    pub url: Url,
    /// Id of the [`Source`] whose seed page linked here.
    pub origin: String,
}

/// The normalized content of one article page.
///
/// Only records with a non-empty title and a body of at least the configured
/// minimum length are ever constructed; shorter pages are dropped by the
/// extractor before classification.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleRecord {
    pub url: String,
    pub title: String,
    #[serde(skip_serializing)]
    pub body: String,
    pub source_label: String,
    /// `HH:MM` token found in the body, if any.
    pub time_of_day: Option<String>,
}

/// What the classifier based its decision on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Basis {
    /// At least one strong phrase matched.
    StrongPhrase,
    /// Context (and possibly weak) terms reached the threshold.
    Context,
    /// The record comes from the jurisdiction's institutional domain.
    InstitutionalSource,
    /// Nothing relevant enough was found.
    Insufficient,
}

/// The classifier's decision for one [`ArticleRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelevanceVerdict {
    pub accepted: bool,
    pub matched_phrase: Option<String>,
    pub score: u32,
    pub basis: Basis,
}

/// An accepted article, formatted for delivery.
#[derive(Debug, Clone, Serialize)]
pub struct ResultItem {
    pub record: ArticleRecord,
    pub matched_phrase: Option<String>,
    /// Summary or title, already HTML-escaped for the transport.
    pub headline: String,
}
