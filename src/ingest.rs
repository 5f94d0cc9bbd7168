//! Ingestion pipeline orchestration.
//!
//! Coordinates the import flow: raw file → records → normalization → raw
//! store → (optionally) search index. Also hosts the `init` and `rebuild`
//! commands, which provision and repopulate the index.
//!
//! The raw store deduplicates by URL: re-importing a document overwrites its
//! file. The index is only appended to for URLs it does not hold yet; a
//! changed document reaches the index on the next rebuild.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::dates::now_iso;
use crate::index::{connect_index, IndexManager, PopulateStats};
use crate::models::Source;
use crate::normalize::{normalize_batch, normalizer_for, parse_records, Normalizer};
use crate::progress::RebuildProgressReporter;
use crate::store::RawStore;

/// Counters reported by an import.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub records: usize,
    pub documents: usize,
    pub skipped: usize,
    pub failed: usize,
    pub saved: usize,
    pub indexed: usize,
    pub already_indexed: usize,
}

/// Normalize `records`, save every document, and optionally index new ones.
pub async fn import_records(
    store: &RawStore,
    index: Option<&IndexManager>,
    normalizer: &dyn Normalizer,
    records: Vec<Value>,
    parsing_time: &str,
) -> Result<ImportStats> {
    let mut stats = ImportStats {
        records: records.len(),
        ..Default::default()
    };
    let batch = normalize_batch(normalizer, records, parsing_time);
    stats.documents = batch.documents.len();
    stats.skipped = batch.skipped;
    stats.failed = batch.failed;

    for doc in &batch.documents {
        store.save(doc)?;
        stats.saved += 1;

        if let Some(index) = index {
            if index.exists(&doc.url).await? {
                stats.already_indexed += 1;
                continue;
            }
            index.add(doc).await?;
            stats.indexed += 1;
        }
    }
    Ok(stats)
}

/// `rsp import <source> <file>`.
pub async fn run_import(
    config: &Config,
    source: Source,
    file: &Path,
    database: Option<&str>,
    with_index: bool,
) -> Result<ImportStats> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read input file: {}", file.display()))?;
    let records = parse_records(&content)
        .with_context(|| format!("Failed to parse input file: {}", file.display()))?;
    let normalizer = normalizer_for(source, database)?;
    let store = RawStore::new(config.store.require_path()?);

    let index = if with_index {
        Some(connect_index(config).await?)
    } else {
        None
    };

    info!(source = %source, file = %file.display(), records = records.len(), "importing");
    let stats = import_records(&store, index.as_ref(), normalizer.as_ref(), records, &now_iso()).await?;
    if stats.failed > 0 {
        warn!(failed = stats.failed, "some records could not be normalized");
    }

    println!("import {} {}", source, file.display());
    println!("  records: {}", stats.records);
    println!("  documents: {}", stats.documents);
    println!("  skipped: {}", stats.skipped);
    println!("  failed: {}", stats.failed);
    println!("  saved: {}", stats.saved);
    if with_index {
        println!("  indexed: {}", stats.indexed);
        println!("  already indexed: {}", stats.already_indexed);
    }
    println!("ok");
    Ok(stats)
}

/// `rsp init`: create the store directory and the index.
pub async fn run_init(config: &Config) -> Result<()> {
    let store_path = config.store.require_path()?;
    std::fs::create_dir_all(store_path)
        .with_context(|| format!("Failed to create store directory: {}", store_path.display()))?;
    let index = connect_index(config).await?;
    println!(
        "Initialized store at {} and index '{}' ({})",
        store_path.display(),
        index.name(),
        index.backend_kind()
    );
    Ok(())
}

/// `rsp rebuild`: repopulate the index from the raw store.
pub async fn run_rebuild(
    config: &Config,
    progress: &dyn RebuildProgressReporter,
) -> Result<PopulateStats> {
    let store = RawStore::new(config.store.require_path()?);
    let index = Arc::new(connect_index(config).await?);
    let stats = index.populate(&store, progress).await?;

    println!("rebuild {}", index.name());
    println!("  indexed: {}", stats.indexed);
    println!("  failed: {}", stats.failed);
    println!("ok");
    Ok(stats)
}
