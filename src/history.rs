//! Persistent set of already processed URLs.
//!
//! The store is read once at startup and written once at the end of a run.
//! On disk it is a JSON array of URL strings, sorted for stable diffs.
//! URLs are only ever added, never removed, which is what guarantees that an
//! article is notified at most once across runs.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

use crate::error::HistoryError;

#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    seen: BTreeSet<String>,
}

impl HistoryStore {
    /// An empty store that will be written to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seen: BTreeSet::new(),
        }
    }

    /// Read the store at `path`. A missing file is an empty history.
    ///
    /// # Errors
    ///
    /// [`HistoryError::Corrupt`] if the file is not a JSON array of strings:
    /// starting from scratch would re-notify every article ever sent.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref().to_path_buf();
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No history file yet; starting empty");
                return Ok(Self::empty(path));
            }
            Err(source) => return Err(HistoryError::Io { path, source }),
        };

        let seen = if raw.trim().is_empty() {
            BTreeSet::new()
        } else {
            match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(urls) => urls.into_iter().collect(),
                Err(source) => return Err(HistoryError::Corrupt { path, source }),
            }
        };
        info!(count = seen.len(), "Loaded history");
        Ok(Self { path, seen })
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    /// Record `url` as processed. Returns `false` if it was already known.
    pub fn add(&mut self, url: impl Into<String>) -> bool {
        self.seen.insert(url.into())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file with the sorted set, via a temp file and rename.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn flush(&self) -> Result<(), HistoryError> {
        let io_err = |source| HistoryError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let urls: Vec<&String> = self.seen.iter().collect();
        let mut json = serde_json::to_string_pretty(&urls).map_err(|source| HistoryError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        json.push('\n');

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await.map_err(io_err)?;
        fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        info!(count = self.seen.len(), "Flushed history");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::load(dir.path().join("enviadas.json")).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_flush_writes_sorted_array_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".github/enviadas.json");
        let mut store = HistoryStore::empty(&path);
        store.add("https://www.olhardireto.com.br/noticias/exibir.asp?id=2");
        store.add("https://g1.globo.com/mt/a.ghtml");
        assert!(!store.add("https://g1.globo.com/mt/a.ghtml"));
        store.flush().await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let urls: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://g1.globo.com/mt/a.ghtml".to_string(),
                "https://www.olhardireto.com.br/noticias/exibir.asp?id=2".to_string(),
            ]
        );

        let reloaded = HistoryStore::load(&path).await.unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("https://g1.globo.com/mt/a.ghtml"));
    }

    #[tokio::test]
    async fn test_reads_legacy_unsorted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enviadas.json");
        std::fs::write(&path, r#"["https://b.com.br/2", "https://a.com.br/1", "https://b.com.br/2"]"#).unwrap();
        let store = HistoryStore::load(&path).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enviadas.json");
        std::fs::write(&path, r#"{"not": "an array"}"#).unwrap();
        let err = HistoryStore::load(&path).await.unwrap_err();
        assert!(matches!(err, HistoryError::Corrupt { .. }));
    }

    proptest! {
        #[test]
        fn prop_added_urls_stay_present(urls in prop::collection::vec("https://[a-z]{1,6}\\.com\\.br/[a-z0-9]{0,8}", 0..40)) {
            let mut store = HistoryStore::empty("unused.json");
            for (i, url) in urls.iter().enumerate() {
                store.add(url.clone());
                for earlier in &urls[..=i] {
                    prop_assert!(store.contains(earlier));
                }
            }
        }
    }
}
