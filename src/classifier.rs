//! Layered keyword relevance classifier.
//!
//! Text is folded (lower-case, diacritics stripped) and tokenized on
//! non-alphanumeric characters, then matched against three tiers:
//!
//! | Tier | Weight | Counts when |
//! |------|--------|-------------|
//! | strong phrase | 2 | always; any hit accepts on its own |
//! | context token | 1 | always, but never accepts alone in strict mode |
//! | weak term | 1 | only if a context token also matched |
//!
//! Strict mode accepts at score ≥ 2, relaxed mode at ≥ 1. Records whose URL
//! host belongs to an institutional domain are accepted unconditionally.
//!
//! Each tier counts distinct terms, so repeating a term never changes the score.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::models::{ArticleRecord, Basis, RelevanceVerdict};
use crate::urls::{bare_host, host_matches};
use crate::utils::fold_text;

const STRONG_WEIGHT: u32 = 2;
const STRICT_THRESHOLD: u32 = 2;
const RELAXED_THRESHOLD: u32 = 1;

/// Keyword tables. A trailing `*` turns the last word into a prefix (stem).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordPolicy {
    pub strong: Vec<String>,
    pub context: Vec<String>,
    pub weak: Vec<String>,
    #[serde(default)]
    pub institutional_domains: Vec<String>,
}

impl Default for KeywordPolicy {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            strong: strings(&[
                "ação trabalhista",
                "reclamação trabalhista",
                "reclamatória trabalhista",
                "processo trabalhista",
                "causa trabalhista",
                "condenação trabalhista",
                "indenização trabalhista",
                "direitos trabalhistas",
                "justiça do trabalho",
                "juiz do trabalho",
                "juíza do trabalho",
                "vara do trabalho",
                "tribunal regional do trabalho",
                "tribunal superior do trabalho",
                "ministério público do trabalho",
            ]),
            context: strings(&[
                "trt",
                "trt23",
                "tst",
                "mpt",
                "clt",
                "consolidação das leis do trabalho",
                "trabalhist*",
            ]),
            weak: strings(&[
                "sentença",
                "decisão",
                "liminar",
                "recurso",
                "indenização",
                "condenação",
                "condenad*",
                "acordo",
                "audiência",
                "julgamento",
                "rescisão",
                "horas extras",
                "assédio moral",
                "dano moral",
                "vínculo empregatício",
                "justa causa",
                "verbas rescisórias",
                "demissão",
            ]),
            institutional_domains: strings(&["trt23.jus.br"]),
        }
    }
}

/// One compiled table entry.
#[derive(Debug, Clone)]
struct Term {
    label: String,
    words: Vec<String>,
    stem: bool,
}

impl Term {
    fn compile(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let stem = raw.ends_with('*');
        let folded = fold_text(raw.trim_end_matches('*'));
        let words: Vec<String> = tokens(&folded).into_iter().map(str::to_string).collect();
        if words.is_empty() {
            return None;
        }
        let mut label = words.join(" ");
        if stem {
            label.push('*');
        }
        Some(Self { label, words, stem })
    }

    fn found_in(&self, tokens: &[&str]) -> bool {
        let last = self.words.len() - 1;
        tokens.windows(self.words.len()).any(|window| {
            window.iter().zip(&self.words).enumerate().all(|(i, (token, word))| {
                if self.stem && i == last {
                    token.starts_with(word.as_str())
                } else {
                    token == word
                }
            })
        })
    }
}

fn tokens(folded: &str) -> Vec<&str> {
    folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

fn compile_all(raw: &[String]) -> Vec<Term> {
    raw.iter().filter_map(|r| Term::compile(r)).collect()
}

fn hits<'a>(terms: &'a [Term], tokens: &[&str]) -> Vec<&'a Term> {
    terms.iter().filter(|t| t.found_in(tokens)).collect()
}

/// Pure, deterministic relevance scorer built from a [`KeywordPolicy`].
#[derive(Debug, Clone)]
pub struct Classifier {
    strong: Vec<Term>,
    context: Vec<Term>,
    weak: Vec<Term>,
    institutional: Vec<String>,
    strict: bool,
}

impl Classifier {
    pub fn new(policy: &KeywordPolicy, strict: bool) -> Self {
        Self {
            strong: compile_all(&policy.strong),
            context: compile_all(&policy.context),
            weak: compile_all(&policy.weak),
            institutional: policy.institutional_domains.clone(),
            strict,
        }
    }

    pub fn threshold(&self) -> u32 {
        if self.strict {
            STRICT_THRESHOLD
        } else {
            RELAXED_THRESHOLD
        }
    }

    fn is_institutional(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|url| {
            let host = bare_host(&url);
            self.institutional.iter().any(|domain| host_matches(host, domain))
        })
    }

    pub fn classify(&self, record: &ArticleRecord) -> RelevanceVerdict {
        let folded = fold_text(&format!("{} {}", record.title, record.body));
        let tokens = tokens(&folded);

        let strong = hits(&self.strong, &tokens);
        let context = hits(&self.context, &tokens);
        let weak = if context.is_empty() {
            Vec::new()
        } else {
            hits(&self.weak, &tokens)
        };

        let score = STRONG_WEIGHT * strong.len() as u32 + context.len() as u32 + weak.len() as u32;
        let matched_phrase = strong
            .first()
            .or_else(|| context.first())
            .map(|t| t.label.clone());

        let (accepted, basis) = if self.is_institutional(&record.url) {
            (true, Basis::InstitutionalSource)
        } else if !strong.is_empty() {
            (true, Basis::StrongPhrase)
        } else if !context.is_empty() && score >= self.threshold() {
            (true, Basis::Context)
        } else {
            (false, Basis::Insufficient)
        };

        RelevanceVerdict {
            accepted,
            matched_phrase,
            score,
            basis,
        }
    }
}
