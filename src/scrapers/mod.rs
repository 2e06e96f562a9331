//! Link discovery and article extraction.
//!
//! Both scrapers follow the same two-phase pattern as the rest of the
//! pipeline: fetch through [`crate::fetch::Fetch`], then parse the HTML
//! synchronously (`scraper::Html` is not `Send`, so it never lives across
//! an `.await`).
//!
//! - [`links`]: seed page → ordered, deduplicated [`crate::models::CandidateLink`]s
//! - [`article`]: article page → [`crate::models::ArticleRecord`]

pub mod article;
pub mod links;
