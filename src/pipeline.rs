//! Pipeline orchestration: sources → links → extraction → classification →
//! history → bounded result list.
//!
//! Per candidate URL:
//!
//! ```text
//! Discovered ─► (in history? skip) ─► Fetching ─► Extracted ─► Classified ─► Recorded
//!                                        │            │
//!                                        └────────────┴─► Dropped (not recorded)
//! ```
//!
//! A URL is recorded in history once it has been classified, accepted or
//! not. Fetch failures and thin pages are dropped without recording, so a
//! later run may try them again.
//!
//! Sources run through a small ordered worker pool (`buffered`), each one
//! sequential over its own links, so results come out in source order and,
//! within a source, in link order. The history and the set of URLs claimed
//! during this run share one mutex, which keeps two sources from processing
//! the same article twice. Page and result budgets are atomic reservations
//! checked between extractions.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

use crate::api::{Summarize, Summary};
use crate::classifier::Classifier;
use crate::error::CrawlError;
use crate::fetch::Fetch;
use crate::history::HistoryStore;
use crate::models::{CandidateLink, ResultItem, Source};
use crate::outputs::message::format_headline;
use crate::policy::DomainPolicy;
use crate::scrapers::article::Extractor;
use crate::scrapers::links::discover;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    pub max_links_per_source: usize,
    /// Total article pages fetched in one run.
    pub max_pages: usize,
    /// Accepted results in one run.
    pub max_results: usize,
    /// Sources processed concurrently.
    pub workers: usize,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_links_per_source: 30,
            max_pages: 120,
            max_results: 15,
            workers: 4,
        }
    }
}

/// Per-stage counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub sources: usize,
    pub discovered: usize,
    pub skipped_seen: usize,
    pub pages_analyzed: usize,
    pub fetch_failed: usize,
    pub empty_content: usize,
    pub rejected: usize,
    pub vetoed: usize,
    pub accepted: usize,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub results: Vec<ResultItem>,
    pub stats: RunStats,
}

#[derive(Debug, Default)]
struct Counters {
    discovered: AtomicUsize,
    skipped_seen: AtomicUsize,
    fetch_failed: AtomicUsize,
    empty_content: AtomicUsize,
    rejected: AtomicUsize,
    vetoed: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

struct Budget {
    pages: AtomicUsize,
    results: AtomicUsize,
    max_pages: usize,
    max_results: usize,
}

impl Budget {
    fn new(limits: &RunLimits) -> Self {
        Self {
            pages: AtomicUsize::new(0),
            results: AtomicUsize::new(0),
            max_pages: limits.max_pages,
            max_results: limits.max_results,
        }
    }

    fn exhausted(&self) -> bool {
        self.pages.load(Ordering::SeqCst) >= self.max_pages
            || self.results.load(Ordering::SeqCst) >= self.max_results
    }

    fn reserve(counter: &AtomicUsize, max: usize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .is_ok()
    }

    fn reserve_page(&self) -> bool {
        Self::reserve(&self.pages, self.max_pages)
    }

    fn reserve_result(&self) -> bool {
        Self::reserve(&self.results, self.max_results)
    }
}

/// History plus the URLs already claimed by some worker in this run.
struct Ledger<'h> {
    history: &'h mut HistoryStore,
    in_flight: HashSet<String>,
}

impl Ledger<'_> {
    /// `true` if the caller now owns `url` for this run.
    fn claim(&mut self, url: &str) -> bool {
        !self.history.contains(url) && self.in_flight.insert(url.to_string())
    }
}

enum LinkOutcome {
    Accepted(ResultItem),
    Rejected,
    Dropped,
}

pub struct Pipeline {
    fetcher: Arc<dyn Fetch>,
    policy: DomainPolicy,
    extractor: Extractor,
    classifier: Classifier,
    summarizer: Option<Arc<dyn Summarize>>,
    limits: RunLimits,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn Fetch>,
        policy: DomainPolicy,
        extractor: Extractor,
        classifier: Classifier,
        limits: RunLimits,
    ) -> Self {
        Self {
            fetcher,
            policy,
            extractor,
            classifier,
            summarizer: None,
            limits,
        }
    }

    /// Route accepted records through `summarizer` for a headline and a veto.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarize>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Crawl every source once. Per-source and per-link failures are logged
    /// and skipped; this never fails as a whole.
    #[instrument(level = "info", skip_all, fields(sources = sources.len()))]
    pub async fn run(&self, sources: &[Source], history: &mut HistoryStore) -> RunOutcome {
        let known_before = history.len();
        let ledger = Mutex::new(Ledger {
            history,
            in_flight: HashSet::new(),
        });
        let budget = Budget::new(&self.limits);
        let counters = Counters::default();

        let per_source: Vec<Vec<ResultItem>> = stream::iter(sources)
            .map(|source| self.process_source(source, &ledger, &budget, &counters))
            .buffered(self.limits.workers.max(1))
            .collect()
            .await;
        let results: Vec<ResultItem> = per_source.into_iter().flatten().collect();

        let history = ledger.into_inner().unwrap_or_else(PoisonError::into_inner).history;
        let recorded = history.len() - known_before;
        let stats = RunStats {
            sources: sources.len(),
            discovered: counters.discovered.into_inner(),
            skipped_seen: counters.skipped_seen.into_inner(),
            pages_analyzed: budget.pages.into_inner(),
            fetch_failed: counters.fetch_failed.into_inner(),
            empty_content: counters.empty_content.into_inner(),
            rejected: counters.rejected.into_inner(),
            vetoed: counters.vetoed.into_inner(),
            accepted: results.len(),
        };
        info!(?stats, recorded, "Pipeline run complete");
        RunOutcome { results, stats }
    }

    #[instrument(level = "info", skip_all, fields(source = %source.id))]
    async fn process_source(
        &self,
        source: &Source,
        ledger: &Mutex<Ledger<'_>>,
        budget: &Budget,
        counters: &Counters,
    ) -> Vec<ResultItem> {
        let mut results = Vec::new();
        if budget.exhausted() {
            debug!("Budget exhausted before source started");
            return results;
        }

        let links = discover(
            self.fetcher.as_ref(),
            &self.policy,
            source,
            self.limits.max_links_per_source,
        )
        .await;
        counters.discovered.fetch_add(links.len(), Ordering::Relaxed);

        for link in links {
            if budget.exhausted() {
                debug!("Budget exhausted; stopping source");
                break;
            }
            let claimed = lock(ledger).claim(link.url.as_str());
            if !claimed {
                debug!(url = %link.url, "Already processed; skipping");
                bump(&counters.skipped_seen);
                continue;
            }
            if !budget.reserve_page() {
                break;
            }

            match self.process_link(&link, counters).await {
                LinkOutcome::Accepted(item) => {
                    if !budget.reserve_result() {
                        debug!(url = %link.url, "Result budget reached; leaving article for a later run");
                        break;
                    }
                    record(ledger, &link);
                    results.push(item);
                }
                LinkOutcome::Rejected => record(ledger, &link),
                LinkOutcome::Dropped => {}
            }
        }

        info!(accepted = results.len(), "Source done");
        results
    }

    async fn process_link(&self, link: &CandidateLink, counters: &Counters) -> LinkOutcome {
        let record = match self.extractor.extract(self.fetcher.as_ref(), &link.url).await {
            Ok(record) => record,
            Err(CrawlError::FetchFailed(e)) => {
                warn!(url = %link.url, source = %link.origin, error = %e, "Article fetch failed");
                bump(&counters.fetch_failed);
                return LinkOutcome::Dropped;
            }
            Err(e) => {
                debug!(url = %link.url, error = %e, "Article dropped");
                bump(&counters.empty_content);
                return LinkOutcome::Dropped;
            }
        };

        let verdict = self.classifier.classify(&record);
        if !verdict.accepted {
            debug!(url = %link.url, score = verdict.score, "Not relevant");
            bump(&counters.rejected);
            return LinkOutcome::Rejected;
        }

        let summary = match &self.summarizer {
            None => None,
            Some(summarizer) => {
                let text = format!("{}\n\n{}", record.title, record.body);
                match summarizer.summarize(&text).await {
                    Ok(Summary::Discard) => {
                        info!(url = %link.url, "Summarizer discarded article");
                        bump(&counters.vetoed);
                        return LinkOutcome::Rejected;
                    }
                    Ok(Summary::Text(text)) => Some(text),
                    Err(e) => {
                        warn!(url = %link.url, error = %e, "Summarizer failed; using title");
                        None
                    }
                }
            }
        };

        info!(
            url = %link.url,
            source = %link.origin,
            score = verdict.score,
            basis = ?verdict.basis,
            matched = ?verdict.matched_phrase,
            "Accepted article"
        );
        LinkOutcome::Accepted(ResultItem {
            headline: format_headline(summary.as_deref(), &record.title),
            matched_phrase: verdict.matched_phrase,
            record,
        })
    }
}

/// A panic elsewhere never leaves the ledger half-updated, so a poisoned
/// lock is still safe to use.
fn lock<'a, 'h>(ledger: &'a Mutex<Ledger<'h>>) -> MutexGuard<'a, Ledger<'h>> {
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

fn record(ledger: &Mutex<Ledger<'_>>, link: &CandidateLink) {
    lock(ledger).history.add(link.url.as_str());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::KeywordPolicy;
    use crate::fetch::testing::StaticFetcher;
    use crate::scrapers::article::SourceLabels;
    use async_trait::async_trait;
    use url::Url;

    const SEED: &str = "https://www.noticiasmt.com.br/noticias";
    const ARTICLE: &str = "https://www.noticiasmt.com.br/noticias/123-a%C3%A7%C3%A3o-trabalhista";
    const FILLER: &str = "A prefeitura de Cuiabá anunciou nesta segunda-feira um novo cronograma \
        de obras para os bairros da região norte, com previsão de conclusão no segundo semestre \
        e investimento estimado em milhões de reais pela administração municipal.";

    fn article(title: &str, body: &str) -> String {
        format!(
            "<html><head><title>{title}</title></head><body><h1>{title}</h1>\
             <article><p>{body}</p></article></body></html>"
        )
    }

    fn relevant_body() -> String {
        format!("{FILLER} O TRT confirmou a ação trabalhista movida por ex-funcionários.")
    }

    fn links_page(hrefs: &[&str]) -> String {
        hrefs
            .iter()
            .map(|h| format!(r#"<a href="{h}">link</a>"#))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn source() -> Source {
        Source::new("noticiasmt", "Notícias MT", Url::parse(SEED).unwrap())
    }

    fn pipeline(fetcher: Arc<StaticFetcher>, limits: RunLimits) -> Pipeline {
        Pipeline::new(
            fetcher,
            DomainPolicy::default(),
            Extractor::new(SourceLabels::new(&[source()], &Default::default()), 200),
            Classifier::new(&KeywordPolicy::default(), true),
            limits,
        )
    }

    fn scenario_a_fetcher() -> Arc<StaticFetcher> {
        Arc::new(
            StaticFetcher::new()
                .page(SEED, links_page(&["/noticias/123-ação-trabalhista", "/sobre"]))
                .page(ARTICLE, article("Ex-funcionários vencem na Justiça", &relevant_body())),
        )
    }

    #[tokio::test]
    async fn test_scenario_a_single_relevant_article() {
        let fetcher = scenario_a_fetcher();
        let pipeline = pipeline(fetcher.clone(), RunLimits::default());
        let mut history = HistoryStore::empty("unused.json");

        let outcome = pipeline.run(&[source()], &mut history).await;

        assert_eq!(outcome.results.len(), 1);
        let item = &outcome.results[0];
        assert_eq!(item.record.url, ARTICLE);
        assert_eq!(item.record.source_label, "Notícias MT");
        assert_eq!(item.matched_phrase.as_deref(), Some("acao trabalhista"));
        assert_eq!(item.headline, "Ex-funcionários vencem na Justiça");
        assert!(pipeline.classifier.classify(&item.record).score >= 2);

        assert_eq!(fetcher.calls(), vec![SEED.to_string(), ARTICLE.to_string()]);
        assert!(history.contains(ARTICLE));
        assert_eq!(outcome.stats.accepted, 1);
    }

    #[tokio::test]
    async fn test_scenario_b_known_link_is_skipped_before_fetch() {
        let fetcher = scenario_a_fetcher();
        let pipeline = pipeline(fetcher.clone(), RunLimits::default());
        let mut history = HistoryStore::empty("unused.json");
        history.add(ARTICLE);

        let outcome = pipeline.run(&[source()], &mut history).await;

        assert!(outcome.results.is_empty());
        assert_eq!(outcome.stats.discovered, 1);
        assert_eq!(outcome.stats.skipped_seen, 1);
        assert_eq!(fetcher.calls(), vec![SEED.to_string()]);
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_scenario_c_thin_page_is_dropped_and_not_recorded() {
        let body = "x".repeat(180);
        let fetcher = Arc::new(
            StaticFetcher::new()
                .page(SEED, links_page(&["/noticias/123-ação-trabalhista"]))
                .page(ARTICLE, article("Ação trabalhista", &body)),
        );
        let pipeline = pipeline(fetcher.clone(), RunLimits::default());
        let mut history = HistoryStore::empty("unused.json");

        let outcome = pipeline.run(&[source()], &mut history).await;

        assert!(outcome.results.is_empty());
        assert_eq!(outcome.stats.empty_content, 1);
        assert_eq!(outcome.stats.pages_analyzed, 1);
        assert!(!history.contains(ARTICLE));
    }

    #[tokio::test]
    async fn test_second_run_finds_nothing_new() {
        let fetcher = scenario_a_fetcher();
        let pipeline = pipeline(fetcher.clone(), RunLimits::default());
        let mut history = HistoryStore::empty("unused.json");

        let first = pipeline.run(&[source()], &mut history).await;
        let second = pipeline.run(&[source()], &mut history).await;

        assert_eq!(first.results.len(), 1);
        assert!(second.results.is_empty());
        assert_eq!(second.stats.skipped_seen, 1);
        assert_eq!(fetcher.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_articles_are_recorded() {
        let url = "https://www.noticiasmt.com.br/noticias/55-obras";
        let fetcher = Arc::new(
            StaticFetcher::new()
                .page(SEED, links_page(&["/noticias/55-obras"]))
                .page(url, article("Obras na região norte", FILLER)),
        );
        let pipeline = pipeline(fetcher, RunLimits::default());
        let mut history = HistoryStore::empty("unused.json");

        let outcome = pipeline.run(&[source()], &mut history).await;

        assert!(outcome.results.is_empty());
        assert_eq!(outcome.stats.rejected, 1);
        assert!(history.contains(url));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_retried_next_run() {
        let fetcher = Arc::new(StaticFetcher::new().page(SEED, links_page(&["/noticias/9-fora-do-ar"])));
        let pipeline = pipeline(fetcher.clone(), RunLimits::default());
        let mut history = HistoryStore::empty("unused.json");

        let first = pipeline.run(&[source()], &mut history).await;
        let second = pipeline.run(&[source()], &mut history).await;

        assert_eq!(first.stats.fetch_failed, 1);
        assert_eq!(second.stats.fetch_failed, 1);
        assert!(history.is_empty());
        assert_eq!(fetcher.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_unreachable_source_does_not_stop_others() {
        let broken = Source::new("fora", "Fora do ar", Url::parse("https://fora.com.br/").unwrap());
        let fetcher = scenario_a_fetcher();
        let pipeline = pipeline(fetcher, RunLimits::default());
        let mut history = HistoryStore::empty("unused.json");

        let outcome = pipeline.run(&[broken, source()], &mut history).await;

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.stats.sources, 2);
    }

    fn many_relevant(n: usize) -> (Arc<StaticFetcher>, Vec<String>) {
        let hrefs: Vec<String> = (1..=n).map(|i| format!("/noticias/{i}-materia")).collect();
        let refs: Vec<&str> = hrefs.iter().map(String::as_str).collect();
        let mut fetcher = StaticFetcher::new().page(SEED, links_page(&refs));
        let mut urls = Vec::new();
        for href in &hrefs {
            let url = format!("https://www.noticiasmt.com.br{href}");
            fetcher = fetcher.page(&url, article("Matéria", &relevant_body()));
            urls.push(url);
        }
        (Arc::new(fetcher), urls)
    }

    #[tokio::test]
    async fn test_page_budget_caps_fetches() {
        let (fetcher, _) = many_relevant(5);
        let limits = RunLimits {
            max_pages: 2,
            ..Default::default()
        };
        let pipeline = pipeline(fetcher.clone(), limits);
        let mut history = HistoryStore::empty("unused.json");

        let outcome = pipeline.run(&[source()], &mut history).await;

        assert_eq!(outcome.stats.pages_analyzed, 2);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(fetcher.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_result_budget_keeps_order_and_leaves_rest_unrecorded() {
        let (fetcher, urls) = many_relevant(4);
        let limits = RunLimits {
            max_results: 2,
            ..Default::default()
        };
        let pipeline = pipeline(fetcher, limits);
        let mut history = HistoryStore::empty("unused.json");

        let outcome = pipeline.run(&[source()], &mut history).await;

        let got: Vec<&str> = outcome.results.iter().map(|r| r.record.url.as_str()).collect();
        assert_eq!(got, vec![urls[0].as_str(), urls[1].as_str()]);
        assert!(!history.contains(&urls[2]));
        assert!(!history.contains(&urls[3]));
    }

    #[tokio::test]
    async fn test_shared_article_is_processed_once_across_sources() {
        let second_seed = "https://www.noticiasmt.com.br/ultimas";
        let fetcher = Arc::new(
            StaticFetcher::new()
                .page(SEED, links_page(&["/noticias/123-ação-trabalhista"]))
                .page(second_seed, links_page(&["/noticias/123-ação-trabalhista#topo"]))
                .page(ARTICLE, article("Ex-funcionários vencem", &relevant_body())),
        );
        let other = Source::new("ultimas", "Últimas", Url::parse(second_seed).unwrap());
        let pipeline = pipeline(fetcher.clone(), RunLimits::default());
        let mut history = HistoryStore::empty("unused.json");

        let outcome = pipeline.run(&[source(), other], &mut history).await;

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(fetcher.calls().iter().filter(|c| *c == ARTICLE).count(), 1);
    }

    #[tokio::test]
    async fn test_institutional_source_still_needs_a_real_body() {
        let seed = "https://portal.trt23.jus.br/portal/noticias";
        let short = "https://portal.trt23.jus.br/portal/noticias/aviso";
        let full = "https://portal.trt23.jus.br/portal/noticias/semana-da-conciliacao";
        let fetcher = Arc::new(
            StaticFetcher::new()
                .page(seed, links_page(&["/portal/noticias/aviso", "/portal/noticias/semana-da-conciliacao"]))
                .page(short, article("Aviso", "Expediente suspenso."))
                .page(full, article("Semana da conciliação", FILLER)),
        );
        let trt = Source::new("trt23", "TRT-23", Url::parse(seed).unwrap());
        let pipeline = pipeline(fetcher, RunLimits::default());
        let mut history = HistoryStore::empty("unused.json");

        let outcome = pipeline.run(&[trt], &mut history).await;

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].record.url, full);
        assert_eq!(outcome.results[0].record.source_label, "TRT-23");
        assert_eq!(outcome.stats.empty_content, 1);
    }

    #[test]
    fn test_poisoned_ledger_keeps_working() {
        let mut history = HistoryStore::empty("unused.json");
        let ledger = Mutex::new(Ledger {
            history: &mut history,
            in_flight: HashSet::new(),
        });
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ledger.lock().unwrap();
            panic!("worker died while holding the ledger");
        }));
        assert!(ledger.is_poisoned());

        let link = CandidateLink {
            url: Url::parse(ARTICLE).unwrap(),
            origin: "noticiasmt".to_string(),
        };
        assert!(lock(&ledger).claim(ARTICLE));
        assert!(!lock(&ledger).claim(ARTICLE));
        record(&ledger, &link);
        let history = ledger.into_inner().unwrap_or_else(PoisonError::into_inner).history;
        assert!(history.contains(ARTICLE));
    }

    #[tokio::test]
    async fn test_homepage_alias_is_never_a_result() {
        let seed = "https://www.folhamax.com/";
        let home = format!("{FILLER} O TRT concedeu liminar.");
        let fetcher = Arc::new(
            StaticFetcher::new()
                .page(seed, links_page(&["/", "https://folhamax.com/", "/index.php"]))
                .page("https://folhamax.com/", article("Folha Max", &home))
                .page("https://www.folhamax.com/index.php", article("Folha Max", &home)),
        );
        let folha = Source::new("folhamax", "Folha Max", Url::parse(seed).unwrap());
        let pipeline = pipeline(fetcher.clone(), RunLimits::default());
        let mut history = HistoryStore::empty("unused.json");

        let outcome = pipeline.run(&[folha], &mut history).await;

        assert!(outcome.results.is_empty());
        assert_eq!(outcome.stats.discovered, 0);
        assert_eq!(fetcher.calls(), vec![seed.to_string()]);
        assert!(history.is_empty());
    }

    struct FixedSummary(Summary);

    #[async_trait]
    impl Summarize for FixedSummary {
        async fn summarize(&self, _text: &str) -> anyhow::Result<Summary> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_summarizer_discard_vetoes_but_records() {
        let pipeline = pipeline(scenario_a_fetcher(), RunLimits::default())
            .with_summarizer(Arc::new(FixedSummary(Summary::Discard)));
        let mut history = HistoryStore::empty("unused.json");

        let outcome = pipeline.run(&[source()], &mut history).await;

        assert!(outcome.results.is_empty());
        assert_eq!(outcome.stats.vetoed, 1);
        assert!(history.contains(ARTICLE));
    }

    #[tokio::test]
    async fn test_summary_becomes_escaped_headline() {
        let summary = Summary::Text("TRT <MT> condena empresa & sócios.".to_string());
        let pipeline = pipeline(scenario_a_fetcher(), RunLimits::default())
            .with_summarizer(Arc::new(FixedSummary(summary)));
        let mut history = HistoryStore::empty("unused.json");

        let outcome = pipeline.run(&[source()], &mut history).await;

        assert_eq!(
            outcome.results[0].headline,
            "TRT &lt;MT&gt; condena empresa &amp; sócios."
        );
    }
}
