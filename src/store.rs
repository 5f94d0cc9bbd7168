//! Raw document store.
//!
//! The on-disk source of truth: one JSON file per document at
//! `<root>/<source>/<hash_url(url)>.json`. Files are pretty-printed with a
//! tab indent and sorted keys so that re-saving an unchanged document is a
//! byte-identical no-op. The search index is rebuilt from these files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::hash::hash_url;
use crate::models::{Document, Source};

#[derive(Debug, Clone)]
pub struct RawStore {
    root: PathBuf,
}

impl RawStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the document for `url` lives (whether or not it exists yet).
    pub fn path_for(&self, source: Source, url: &str) -> PathBuf {
        self.root
            .join(source.as_str())
            .join(format!("{}.json", hash_url(url)))
    }

    /// Write a document, overwriting any previous version with the same URL.
    pub fn save(&self, doc: &Document) -> Result<PathBuf> {
        let path = self.path_for(doc.source, &doc.url);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;
        }
        let bytes = to_canonical_json(&doc.to_value()?)?;
        fs::write(&path, bytes)
            .with_context(|| format!("Failed to write document: {}", path.display()))?;
        Ok(path)
    }

    pub fn load(&self, path: &Path) -> Result<Document> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?;
        Document::from_value(value)
            .with_context(|| format!("Invalid document in {}", path.display()))
    }

    pub fn get(&self, source: Source, url: &str) -> Result<Option<Document>> {
        let path = self.path_for(source, url);
        if !path.exists() {
            return Ok(None);
        }
        self.load(&path).map(Some)
    }

    pub fn contains(&self, source: Source, url: &str) -> bool {
        self.path_for(source, url).is_file()
    }

    /// Every `*.json` file under the root, in a stable order.
    ///
    /// A missing root is an empty store.
    pub fn paths(&self) -> Result<Vec<PathBuf>> {
        if !self.root.exists() {
            return Ok(vec![]);
        }
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry
                .with_context(|| format!("Failed to walk store: {}", self.root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                paths.push(entry.into_path());
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// Tab-indented JSON with keys sorted at every level.
pub fn to_canonical_json(value: &Value) -> Result<Vec<u8>> {
    let sorted = sort_keys(value);
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"\t"));
    sorted.serialize(&mut ser)?;
    Ok(out)
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), sort_keys(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
