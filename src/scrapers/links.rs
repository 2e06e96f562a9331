//! Candidate-link discovery on a source's seed page.
//!
//! Every `<a href>` on the seed page is normalized, then run through the
//! domain policy (blocked → scope → article shape). Survivors are
//! deduplicated in first-seen order and capped per source.

use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::CrawlError;
use crate::fetch::Fetch;
use crate::models::{CandidateLink, Source};
use crate::policy::DomainPolicy;
use crate::urls::normalize;

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("link selector"));
static BASE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("base[href]").expect("base selector"));

/// Fetch the seed page of `source` and return at most `max_links` candidates.
///
/// A seed page that cannot be fetched yields an empty list: sources are
/// independent and one unreachable site must not stop the others.
#[instrument(level = "info", skip_all, fields(source = %source.id))]
pub async fn discover(
    fetcher: &dyn Fetch,
    policy: &DomainPolicy,
    source: &Source,
    max_links: usize,
) -> Vec<CandidateLink> {
    let html = match fetcher.fetch(&source.seed).await {
        Ok(html) => html,
        Err(e) => {
            warn!(seed = %source.seed, error = %e, "Seed page fetch failed; skipping source");
            return Vec::new();
        }
    };

    let links = extract_links(&html, policy, source, max_links);
    info!(count = links.len(), seed = %source.seed, "Indexed candidate links");
    debug!(urls = ?links.iter().map(|l| l.url.as_str()).collect::<Vec<_>>(), "Candidate links");
    links
}

/// Pure half of [`discover`]: HTML in, ordered candidates out.
pub fn extract_links(
    html: &str,
    policy: &DomainPolicy,
    source: &Source,
    max_links: usize,
) -> Vec<CandidateLink> {
    let document = Html::parse_document(html);
    let base = document_base(&document, &source.seed);

    document
        .select(&LINK_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty() && !href.starts_with('#'))
        .filter_map(|href| match candidate(href, &base, policy, source) {
            Ok(url) => Some(url),
            Err(e) => {
                debug!(href, error = %e, "Skipping href");
                None
            }
        })
        .unique()
        .take(max_links)
        .map(|url| CandidateLink {
            url,
            origin: source.id.clone(),
        })
        .collect()
}

/// Normalize one href and run it through the domain policy.
fn candidate(
    href: &str,
    base: &Url,
    policy: &DomainPolicy,
    source: &Source,
) -> Result<Url, CrawlError> {
    let url = normalize(href, base)?;
    policy.admit(source, &url)?;
    Ok(url)
}

/// Honour `<base href>` when the page declares one.
fn document_base(document: &Html, seed: &Url) -> Url {
    document
        .select(&BASE_SELECTOR)
        .next()
        .and_then(|base| base.value().attr("href"))
        .and_then(|href| seed.join(href.trim()).ok())
        .unwrap_or_else(|| seed.clone())
}
