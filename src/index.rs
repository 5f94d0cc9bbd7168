//! Search index manager.
//!
//! Owns one named index on a [`SearchBackend`] and is the only writer to
//! it. The raw store is the source of truth; the index is a projection that
//! [`IndexManager::populate`] can rebuild from scratch at any time.
//!
//! # Rebuild
//!
//! ```text
//! RawStore::paths() ──► load ──► index_document ──► … ──► refresh (once)
//!                        │            │
//!                        └─ failure ──┴──► logged, counted, skipped
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::backend::{build_backend, IndexSettings, SearchBackend};
use crate::config::Config;
use crate::models::{Document, SearchHit};
use crate::progress::{RebuildEvent, RebuildProgressReporter};
use crate::retry::{retry, RetryPolicy, Sleeper, TokioSleeper};
use crate::store::RawStore;

/// Emit an indexing progress event every this many files.
const PROGRESS_EVERY: u64 = 50;

/// Outcome of [`IndexManager::populate`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PopulateStats {
    pub indexed: u64,
    pub failed: u64,
}

/// Connect to the configured backend and make sure the index exists.
pub async fn connect_index(config: &Config) -> Result<IndexManager> {
    let backend = build_backend(&config.backend)?;
    IndexManager::connect(
        backend,
        config.backend.index.clone(),
        &config.backend.retry_policy(),
        &TokioSleeper,
    )
    .await
}

pub struct IndexManager {
    backend: Arc<dyn SearchBackend>,
    name: String,
    settings: IndexSettings,
}

impl IndexManager {
    /// A manager for `name`, without contacting the backend.
    pub fn new(backend: Arc<dyn SearchBackend>, name: impl Into<String>) -> Self {
        Self {
            backend,
            name: name.into(),
            settings: IndexSettings::default(),
        }
    }

    /// Wait for the backend to answer its liveness probe, then [`ensure`](Self::ensure) the index.
    pub async fn connect(
        backend: Arc<dyn SearchBackend>,
        name: impl Into<String>,
        policy: &RetryPolicy,
        sleeper: &dyn Sleeper,
    ) -> Result<Self> {
        let manager = Self::new(backend, name);
        info!(backend = manager.backend.kind(), "waiting for search backend");
        retry(policy, sleeper, "search backend", || manager.backend.ping()).await?;
        manager.ensure().await?;
        Ok(manager)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    /// Create the index with the fixed settings if it does not exist.
    pub async fn ensure(&self) -> Result<()> {
        if !self.backend.index_exists(&self.name).await? {
            debug!(index = %self.name, "creating index");
            self.backend
                .create_index(&self.name, &self.settings)
                .await
                .with_context(|| format!("Failed to create index '{}'", self.name))?;
        }
        Ok(())
    }

    /// Drop the index and recreate it empty.
    pub async fn clear(&self) -> Result<()> {
        self.backend.delete_index(&self.name).await?;
        self.backend
            .create_index(&self.name, &self.settings)
            .await
            .with_context(|| format!("Failed to recreate index '{}'", self.name))
    }

    async fn index(&self, doc: &Document) -> Result<()> {
        self.backend.index_document(&self.name, &doc.to_value()?).await
    }

    /// Insert one document and make it searchable. Duplicates are not checked.
    pub async fn add(&self, doc: &Document) -> Result<()> {
        self.index(doc).await?;
        self.backend.refresh(&self.name).await
    }

    /// Whether a document with exactly this `url` is indexed.
    pub async fn exists(&self, url: &str) -> Result<bool> {
        let hits = self.backend.term_query(&self.name, "url", url, 1).await?;
        Ok(!hits.is_empty())
    }

    /// Up to `limit` hits for `query` on document text, best first.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        if limit == 0 {
            return Ok(vec![]);
        }
        let raw = self
            .backend
            .match_query(&self.name, "text", query, limit)
            .await?;
        raw.into_iter()
            .map(|hit| {
                Ok(SearchHit {
                    score: hit.score,
                    document: Document::from_value(hit.source)
                        .context("Index returned an undecodable document")?,
                })
            })
            .collect()
    }

    /// Rebuild the index from every document in `store`.
    ///
    /// Unreadable files and failed writes are logged and counted; they never
    /// stop the rebuild.
    pub async fn populate(
        &self,
        store: &RawStore,
        progress: &dyn RebuildProgressReporter,
    ) -> Result<PopulateStats> {
        progress.report(RebuildEvent::Scanning {
            index: self.name.clone(),
        });
        let paths = store.paths()?;
        let total = paths.len() as u64;
        info!(index = %self.name, files = total, root = %store.root().display(), "rebuilding index");

        self.clear().await?;

        let mut stats = PopulateStats::default();
        for (i, path) in paths.iter().enumerate() {
            match store.load(path) {
                Ok(doc) => match self.index(&doc).await {
                    Ok(()) => stats.indexed += 1,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to index document");
                        debug!(payload = ?doc.to_value().ok(), "rejected document");
                        stats.failed += 1;
                    }
                },
                Err(e) => {
                    error!(path = %path.display(), error = %format!("{:#}", e), "skipping unreadable document");
                    stats.failed += 1;
                }
            }
            let n = i as u64 + 1;
            if n % PROGRESS_EVERY == 0 || n == total {
                progress.report(RebuildEvent::Indexing {
                    index: self.name.clone(),
                    n,
                    total,
                });
            }
        }

        self.backend.refresh(&self.name).await?;
        progress.report(RebuildEvent::Done {
            index: self.name.clone(),
            indexed: stats.indexed,
            failed: stats.failed,
        });
        info!(index = %self.name, indexed = stats.indexed, failed = stats.failed, "rebuild complete");
        Ok(stats)
    }
}
