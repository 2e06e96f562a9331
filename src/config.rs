//! YAML configuration and the built-in source list.
//!
//! Everything here is optional: without a config file the crawler runs the
//! built-in Mato Grosso sources with the default keyword tables.
//!
//! ```yaml
//! sources:
//!   - id: trt23
//!     label: TRT-23
//!     seed: https://portal.trt23.jus.br/portal/noticias
//!     article_shape: { kind: child_of, prefix: /portal/noticias }
//! labels:
//!   midianews.com.br: MidiaNews
//! keywords:
//!   strong: ["ação trabalhista"]
//!   context: ["trt"]
//!   weak: ["liminar"]
//! ```

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, instrument};
use url::Url;

use crate::classifier::KeywordPolicy;
use crate::models::Source;
use crate::policy::ArticleShape;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Replaces the built-in list when present.
    #[serde(default)]
    pub sources: Option<Vec<SourceConfig>>,
    /// Host → label overrides.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Replaces the built-in keyword tables when present.
    #[serde(default)]
    pub keywords: Option<KeywordPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub id: String,
    pub label: String,
    pub seed: String,
    #[serde(default)]
    pub allow_hosts: Vec<String>,
    #[serde(default)]
    pub exclude_hosts: Vec<String>,
    #[serde(default)]
    pub article_shape: Option<ArticleShape>,
}

impl SourceConfig {
    pub fn into_source(self) -> Result<Source> {
        let seed = Url::parse(&self.seed)
            .with_context(|| format!("source `{}`: invalid seed URL `{}`", self.id, self.seed))?;
        if !matches!(seed.scheme(), "http" | "https") || seed.host_str().is_none() {
            bail!("source `{}`: seed must be an absolute http(s) URL", self.id);
        }
        let mut source = Source::new(self.id, self.label, seed);
        source.allow_hosts = self.allow_hosts;
        source.exclude_hosts = self.exclude_hosts;
        source.article_shape = self.article_shape;
        Ok(source)
    }
}

impl AppConfig {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("parsing configuration YAML")
    }

    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_yaml(&raw)?;
        info!(
            sources = config.sources.as_ref().map(Vec::len),
            labels = config.labels.len(),
            custom_keywords = config.keywords.is_some(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Configured sources, or the built-in list. Duplicate ids are an error.
    pub fn sources(&self) -> Result<Vec<Source>> {
        let sources = match &self.sources {
            Some(configured) => configured
                .iter()
                .cloned()
                .map(SourceConfig::into_source)
                .collect::<Result<Vec<_>>>()?,
            None => builtin_sources(),
        };
        let mut seen = std::collections::HashSet::new();
        for source in &sources {
            if !seen.insert(source.id.as_str()) {
                bail!("duplicate source id `{}`", source.id);
            }
        }
        debug!(count = sources.len(), "Resolved sources");
        Ok(sources)
    }

    pub fn keywords(&self) -> KeywordPolicy {
        self.keywords.clone().unwrap_or_default()
    }
}

fn builtin(id: &str, label: &str, seed: &str) -> Source {
    // Literals below are known-good absolute URLs.
    Source::new(id, label, Url::parse(seed).expect("built-in seed URL"))
}

/// The default Mato Grosso source list, in crawl order.
pub fn builtin_sources() -> Vec<Source> {
    let mut g1 = builtin("g1mt", "G1 MT", "https://g1.globo.com/mt/mato-grosso/");
    g1.allow_hosts = vec!["globo.com".to_string()];
    g1.exclude_hosts = ["globoplay", "ge", "gshow", "receitas", "valor", "oglobo"]
        .iter()
        .map(|sub| format!("{sub}.globo.com"))
        .collect();

    vec![
        builtin("trt23", "TRT-23", "https://portal.trt23.jus.br/portal/noticias"),
        g1,
        builtin("olhardireto", "Olhar Direto", "https://www.olhardireto.com.br/"),
        builtin("reportermt", "Repórter MT", "https://www.reportermt.com/"),
        builtin("gazetadigital", "Gazeta Digital", "https://www.gazetadigital.com.br/"),
        builtin("folhamax", "Folha Max", "https://www.folhamax.com/"),
        builtin("estadaomt", "Estadão MT", "https://www.estadaomatogrosso.com.br/"),
    ]
}
