//! URL canonicalization.
//!
//! [`normalize`] turns a raw `href` into an absolute URL that can be compared
//! against history entries: relative links are resolved against the page they
//! were found on, fragments and tracking parameters are dropped, and a few
//! site quirks seen in the wild are repaired.
//!
//! The function is a projection: feeding its output back in returns the same URL.

use url::Url;

use crate::error::CrawlError;

/// Query keys that only identify a campaign or a click, never content.
const TRACKING_KEYS: &[&str] = &[
    "fbclid", "gclid", "dclid", "gbraid", "wbraid", "msclkid", "yclid", "igshid", "mc_cid",
    "mc_eid", "_ga", "_gl", "ref_src",
];

/// Prefix of any campaign parameter (`utm_source`, `utm_medium`, ...).
const TRACKING_PREFIX: &str = "utm_";

/// Percent-encoded characters some CMSs leak into paths (U+FFFD, U+00A0, U+200B).
const STRAY_ENCODINGS: &[&str] = &["%EF%BF%BD", "%C2%A0", "%E2%80%8B"];

/// Left behind when a page HTML-escapes `&` twice (`&amp;amp;id=1`).
const DOUBLE_ESCAPE_PREFIX: &str = "amp;";

/// Host suffix, misspelled key, correct key.
const QUERY_KEY_FIXES: &[(&str, &str, &str)] = &[
    ("olhardireto.com.br", "ID", "id"),
    ("olhardireto.com.br", "Id", "id"),
];

/// Resolve `raw` against `base` and canonicalize the result.
///
/// # Errors
///
/// [`CrawlError::MalformedUrl`] when the href cannot be parsed, has no host,
/// or uses a scheme other than `http`/`https` (`javascript:`, `mailto:`, ...).
pub fn normalize(raw: &str, base: &Url) -> Result<Url, CrawlError> {
    let malformed = |reason: String| CrawlError::MalformedUrl {
        raw: raw.to_string(),
        reason,
    };

    let mut url = base.join(raw.trim()).map_err(|e| malformed(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(malformed(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(malformed("missing host".to_string()));
    }

    url.set_fragment(None);
    strip_stray_encodings(&mut url);
    clean_query(&mut url);
    Ok(url)
}

/// True for `utm_*` keys and the fixed click-id list.
pub fn is_tracking_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with(TRACKING_PREFIX) || TRACKING_KEYS.contains(&key.as_str())
}

/// The URL's host without a leading `www.`.
pub fn bare_host(url: &Url) -> &str {
    let host = url.host_str().unwrap_or_default();
    host.strip_prefix("www.").unwrap_or(host)
}

/// `host` equals `domain` or is one of its subdomains.
pub fn host_matches(host: &str, domain: &str) -> bool {
    let domain = domain.strip_prefix("www.").unwrap_or(domain);
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|rest| rest.ends_with('.'))
}

fn strip_stray_encodings(url: &mut Url) {
    let mut path = url.path().to_string();
    let mut changed = false;
    while let Some(cleaned) = strip_once(&path) {
        path = cleaned;
        changed = true;
    }
    if changed {
        url.set_path(&path);
    }
}

/// Remove every stray sequence from `path`, or `None` if there was none.
fn strip_once(path: &str) -> Option<String> {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    let mut found = false;
    'scan: while !rest.is_empty() {
        for stray in STRAY_ENCODINGS {
            if rest.len() >= stray.len()
                && rest.is_char_boundary(stray.len())
                && rest[..stray.len()].eq_ignore_ascii_case(stray)
            {
                rest = &rest[stray.len()..];
                found = true;
                continue 'scan;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    found.then_some(out)
}

fn clean_query(url: &mut Url) {
    let Some(query) = url.query() else {
        return;
    };
    if query.is_empty() {
        url.set_query(None);
        return;
    }

    let host = bare_host(url).to_string();
    let mut changed = false;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(key, value)| {
            let mut key = key.into_owned();
            while let Some(rest) = key.strip_prefix(DOUBLE_ESCAPE_PREFIX) {
                key = rest.to_string();
                changed = true;
            }
            if let Some(fixed) = fixed_key(&host, &key) {
                key = fixed.to_string();
                changed = true;
            }
            if is_tracking_key(&key) {
                changed = true;
                return None;
            }
            Some((key, value.into_owned()))
        })
        .collect();

    if !changed {
        return;
    }
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
}

fn fixed_key(host: &str, key: &str) -> Option<&'static str> {
    QUERY_KEY_FIXES
        .iter()
        .find(|(domain, typo, _)| *typo == key && host_matches(host, domain))
        .map(|(_, _, correct)| *correct)
}
