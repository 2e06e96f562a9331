//! Article page extraction.
//!
//! Turns one fetched article page into an [`ArticleRecord`]:
//!
//! - **Title**: `og:title` / `twitter:title` metadata, then the first `<h1>`,
//!   then `<title>`; truncated to a fixed number of characters.
//! - **Body**: the first main-content container whose text reaches the minimum
//!   body length, falling back to all visible text of `<body>` (scripts and
//!   styles excluded).
//! - **Time**: the first `HH:MM` or `HHhMM` token in the body, if any.
//! - **Source label**: looked up from the URL host in [`SourceLabels`].
//!
//! Pages whose body is shorter than the configured minimum are rejected here,
//! which is what keeps listing pages that slipped past the URL heuristics out
//! of the classifier.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use tracing::{debug, instrument};
use url::Url;

use crate::error::CrawlError;
use crate::fetch::Fetch;
use crate::models::{ArticleRecord, Source};
use crate::urls::bare_host;
use crate::utils::{collapse_whitespace, truncate_chars};

pub const DEFAULT_MIN_BODY_LEN: usize = 250;
pub const MAX_TITLE_CHARS: usize = 200;

const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static META_TITLE: Lazy<Vec<Selector>> = Lazy::new(|| {
    vec![
        selector(r#"meta[property="og:title"]"#),
        selector(r#"meta[name="twitter:title"]"#),
    ]
});
static H1: Lazy<Selector> = Lazy::new(|| selector("h1"));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("title"));
static BODY: Lazy<Selector> = Lazy::new(|| selector("body"));
static CONTENT_CONTAINERS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        r#"[itemprop="articleBody"]"#,
        ".mc-article-body",
        ".conteudo-materia",
        ".entry-content",
        ".post-content",
        "article",
        "main",
    ]
    .into_iter()
    .map(selector)
    .collect()
});
static TIME_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\D)([01]?\d|2[0-3])[:hH]([0-5]\d)(?:\D|$)").expect("time token regex")
});

/// Static host → human label table, defaulting to the bare host.
#[derive(Debug, Clone)]
pub struct SourceLabels {
    labels: HashMap<String, String>,
}

impl Default for SourceLabels {
    fn default() -> Self {
        let labels = [
            ("portal.trt23.jus.br", "TRT-23"),
            ("trt23.jus.br", "TRT-23"),
            ("g1.globo.com", "G1 MT"),
            ("olhardireto.com.br", "Olhar Direto"),
            ("reportermt.com", "Repórter MT"),
            ("gazetadigital.com.br", "Gazeta Digital"),
            ("folhamax.com", "Folha Max"),
            ("estadaomatogrosso.com.br", "Estadão MT"),
        ]
        .into_iter()
        .map(|(host, label)| (host.to_string(), label.to_string()))
        .collect();
        Self { labels }
    }
}

impl SourceLabels {
    /// Built-in table, then every source's seed host, then explicit overrides.
    pub fn new(sources: &[Source], overrides: &HashMap<String, String>) -> Self {
        let mut table = Self::default();
        for source in sources {
            table.insert(bare_host(&source.seed), &source.label);
        }
        for (host, label) in overrides {
            table.insert(host, label);
        }
        table
    }

    fn insert(&mut self, host: &str, label: &str) {
        let host = host.strip_prefix("www.").unwrap_or(host);
        self.labels.insert(host.to_string(), label.to_string());
    }

    /// Label of the most specific matching host, or the raw host.
    pub fn label_for(&self, url: &Url) -> String {
        let full = bare_host(url);
        let mut host = full;
        loop {
            if let Some(label) = self.labels.get(host) {
                return label.clone();
            }
            match host.split_once('.') {
                Some((_, parent)) => host = parent,
                None => return full.to_string(),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Extractor {
    labels: SourceLabels,
    min_body_len: usize,
}

impl Extractor {
    pub fn new(labels: SourceLabels, min_body_len: usize) -> Self {
        Self {
            labels,
            min_body_len,
        }
    }

    /// Fetch `url` and extract its record.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn extract(&self, fetcher: &dyn Fetch, url: &Url) -> Result<ArticleRecord, CrawlError> {
        let html = fetcher.fetch(url).await?;
        self.parse(url, &html)
    }

    /// Parse already-fetched HTML.
    ///
    /// # Errors
    ///
    /// [`CrawlError::EmptyContent`] when no title is found or the body is
    /// shorter than the configured minimum.
    pub fn parse(&self, url: &Url, html: &str) -> Result<ArticleRecord, CrawlError> {
        let document = Html::parse_document(html);

        let title = page_title(&document)
            .map(|t| truncate_chars(&t, MAX_TITLE_CHARS))
            .unwrap_or_default();
        let body = main_text(&document, self.min_body_len);
        let body_len = body.chars().count();
        if title.is_empty() || body_len < self.min_body_len {
            debug!(title_len = title.len(), body_len, min = self.min_body_len, "Dropping thin page");
            return Err(CrawlError::EmptyContent { body_len });
        }

        Ok(ArticleRecord {
            url: url.to_string(),
            time_of_day: time_token(&body),
            source_label: self.labels.label_for(url),
            title,
            body,
        })
    }
}

fn page_title(document: &Html) -> Option<String> {
    META_TITLE
        .iter()
        .flat_map(|sel| document.select(sel))
        .filter_map(|meta| meta.value().attr("content"))
        .map(collapse_whitespace)
        .find(|t| !t.is_empty())
        .or_else(|| first_text(document, &H1))
        .or_else(|| first_text(document, &TITLE))
}

fn first_text(document: &Html, sel: &Selector) -> Option<String> {
    document
        .select(sel)
        .map(|el| collapse_whitespace(&visible_text(el)))
        .find(|t| !t.is_empty())
}

/// Text of the first content container long enough to be an article body,
/// else all visible text of `<body>`.
fn main_text(document: &Html, min_len: usize) -> String {
    CONTENT_CONTAINERS
        .iter()
        .flat_map(|sel| document.select(sel))
        .map(|el| collapse_whitespace(&visible_text(el)))
        .find(|text| !text.is_empty() && text.chars().count() >= min_len)
        .or_else(|| first_text(document, &BODY))
        .unwrap_or_else(|| collapse_whitespace(&visible_text(document.root_element())))
}

/// Text of `element` minus anything inside script/style-like tags.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_TAGS.contains(&el.name()))
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    out
}

/// First `HH:MM` / `HHhMM` token, normalized to `HH:MM`.
pub fn time_token(text: &str) -> Option<String> {
    let caps = TIME_TOKEN.captures(text)?;
    let hour: u32 = caps[1].parse().ok()?;
    Some(format!("{:02}:{}", hour, &caps[2]))
}
