//! Per-source domain policy.
//!
//! Three pure predicates decide whether a normalized link is worth fetching:
//!
//! 1. [`DomainPolicy::is_blocked`]: social networks, media players, footer and
//!    institutional pages that never carry news.
//! 2. [`DomainPolicy::same_scope`]: the link stays on the source's own site.
//! 3. [`DomainPolicy::looks_like_article`]: the URL has the shape of an article
//!    on that host, rather than a listing or section page.
//!
//! Article shapes are registered per host in a registry; a host with no
//! registered heuristic is accepted and left to the content checks downstream.

use regex::Regex;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

use crate::error::PolicyRejection;
use crate::models::Source;
use crate::urls::{bare_host, host_matches};

/// Hosts (and their subdomains) that are never crawled.
const BLOCKED_HOSTS: &[&str] = &[
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "youtube.com",
    "youtu.be",
    "whatsapp.com",
    "t.me",
    "telegram.me",
    "linkedin.com",
    "tiktok.com",
    "globoplay.globo.com",
    "doubleclick.net",
    "play.google.com",
    "apps.apple.com",
];

/// Whole path segments that mark non-article pages.
const BLOCKED_SEGMENTS: &[&str] = &[
    "sobre",
    "contato",
    "fale-conosco",
    "expediente",
    "anuncie",
    "publicidade",
    "institucional",
    "privacidade",
    "login",
    "assine",
    "cadastro",
    "curso",
    "cursos",
    "classificados",
    "player",
    "video",
    "videos",
    "ao-vivo",
    "podcast",
    "podcasts",
    "galeria",
    "tag",
    "tags",
    "autor",
    "busca",
    "search",
    "feed",
    "rss",
    "ouvidoria",
    "menu",
];

/// Raw substrings that disqualify a path wherever they appear.
const BLOCKED_SUBSTRINGS: &[&str] = &[
    "politica-de-privacidade",
    "termos-de-uso",
    "/wp-admin",
    "/wp-login",
    ".pdf",
    ".jpg",
    ".jpeg",
    ".png",
    ".mp3",
    ".mp4",
];

static DATED_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\d{4}/\d{2}/\d{2}/[^/]").expect("dated path regex"));

/// How an article URL looks on a given host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArticleShape {
    /// Path ends in `/<section>/<digits>` with an optional `-slug` suffix.
    NumericId { section: String },
    /// Path continues below `prefix` (the listing page itself is rejected).
    ChildOf { prefix: String },
    /// Path contains a `/YYYY/MM/DD/` segment followed by more path.
    DatedPath,
    /// The query carries `key` with a non-empty value.
    QueryKey { key: String },
    /// Anything goes; content checks decide.
    Any,
}

impl ArticleShape {
    pub fn matches(&self, url: &Url) -> bool {
        match self {
            ArticleShape::NumericId { section } => {
                let mut segments = url.path().trim_end_matches('/').rsplit('/');
                let (Some(last), Some(parent)) = (segments.next(), segments.next()) else {
                    return false;
                };
                let digits = last.chars().take_while(char::is_ascii_digit).count();
                parent == section
                    && digits > 0
                    && (digits == last.len() || last[digits..].starts_with('-'))
            }
            ArticleShape::ChildOf { prefix } => {
                let prefix = prefix.trim_end_matches('/');
                url.path()
                    .strip_prefix(prefix)
                    .and_then(|rest| rest.strip_prefix('/'))
                    .is_some_and(|rest| !rest.trim_matches('/').is_empty())
            }
            ArticleShape::DatedPath => DATED_SEGMENT.is_match(url.path()),
            ArticleShape::QueryKey { key } => url
                .query_pairs()
                .any(|(k, v)| k == key.as_str() && !v.trim().is_empty()),
            ArticleShape::Any => true,
        }
    }
}

/// Blocked-host/path rules plus the host → [`ArticleShape`] registry.
#[derive(Debug, Clone)]
pub struct DomainPolicy {
    shapes: HashMap<String, ArticleShape>,
}

impl Default for DomainPolicy {
    fn default() -> Self {
        let mut policy = Self {
            shapes: HashMap::new(),
        };
        policy.register(
            "portal.trt23.jus.br",
            ArticleShape::ChildOf {
                prefix: "/portal/noticias".to_string(),
            },
        );
        policy.register("g1.globo.com", ArticleShape::DatedPath);
        policy.register(
            "olhardireto.com.br",
            ArticleShape::QueryKey {
                key: "id".to_string(),
            },
        );
        policy
    }
}

impl DomainPolicy {
    /// A policy with the built-in registry plus every source's own override.
    pub fn for_sources(sources: &[Source]) -> Self {
        let mut policy = Self::default();
        for source in sources {
            if let Some(shape) = &source.article_shape {
                policy.register(bare_host(&source.seed), shape.clone());
            }
        }
        policy
    }

    /// Register (or replace) the heuristic for `host` and its subdomains.
    pub fn register(&mut self, host: impl Into<String>, shape: ArticleShape) {
        let host = host.into();
        let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);
        self.shapes.insert(host, shape);
    }

    /// The most specific registered shape for the URL's host.
    fn shape_for(&self, url: &Url) -> Option<&ArticleShape> {
        let mut host = bare_host(url);
        loop {
            if let Some(shape) = self.shapes.get(host) {
                return Some(shape);
            }
            host = host.split_once('.')?.1;
        }
    }

    pub fn is_blocked(&self, url: &Url) -> bool {
        let host = bare_host(url);
        if BLOCKED_HOSTS.iter().any(|blocked| host_matches(host, blocked)) {
            return true;
        }
        let path = url.path().to_ascii_lowercase();
        if BLOCKED_SUBSTRINGS.iter().any(|s| path.contains(s)) {
            return true;
        }
        path.split('/')
            .any(|segment| BLOCKED_SEGMENTS.contains(&segment))
    }

    /// Host equals or is a subdomain of the seed host, unless the source
    /// declares an explicit allow-list. Excluded siblings always lose.
    pub fn same_scope(&self, source: &Source, url: &Url) -> bool {
        let host = bare_host(url);
        if source
            .exclude_hosts
            .iter()
            .any(|excluded| host_matches(host, excluded))
        {
            return false;
        }
        if source.allow_hosts.is_empty() {
            host_matches(host, bare_host(&source.seed))
        } else {
            source
                .allow_hosts
                .iter()
                .any(|allowed| host_matches(host, allowed))
        }
    }

    /// A site root (`/`, `/index.php`, ...) is never an article, whatever
    /// the host's registered shape.
    pub fn looks_like_article(&self, url: &Url) -> bool {
        !listing_path(url).is_empty() && self.shape_for(url).is_none_or(|shape| shape.matches(url))
    }

    /// `url` is the source's own seed page under another spelling: `www.`
    /// prefix, trailing `/` or an `index.*` document.
    pub fn is_seed_alias(&self, source: &Source, url: &Url) -> bool {
        bare_host(url) == bare_host(&source.seed)
            && listing_path(url) == listing_path(&source.seed)
            && url.query().unwrap_or("") == source.seed.query().unwrap_or("")
    }

    /// Blocked, then scope, then article shape; first failure wins.
    pub fn admit(&self, source: &Source, url: &Url) -> Result<(), PolicyRejection> {
        if self.is_blocked(url) {
            return Err(PolicyRejection::Blocked);
        }
        if !self.same_scope(source, url) {
            return Err(PolicyRejection::OutOfScope);
        }
        if self.is_seed_alias(source, url) || !self.looks_like_article(url) {
            return Err(PolicyRejection::NotArticle);
        }
        Ok(())
    }
}

/// Path without trailing slashes or a final `index` / `index.*` segment.
/// The site root comes out as `""`.
fn listing_path(url: &Url) -> &str {
    let path = url.path().trim_end_matches('/');
    match path.rsplit_once('/') {
        Some((parent, last)) if last == "index" || last.starts_with("index.") => {
            parent.trim_end_matches('/')
        }
        _ => path,
    }
}
