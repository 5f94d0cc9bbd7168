//! In-process search backend built on tantivy.
//!
//! Mirrors the Elasticsearch index layout closely enough that the index
//! manager cannot tell the two apart:
//!
//! - `text` fields use the `tags_analyzer` chain (word tokenizer, lowercase,
//!   English stemmer, ASCII folding); like Elasticsearch's standard tokenizer
//!   it keeps `_` inside words, so `<NEXT_MESSAGE>` is one token;
//! - `url` and `source` are split on whitespace only;
//! - the whole JSON document is stored in a `_source` field and returned
//!   as-is with each hit;
//! - a match query is a disjunction of the analyzed query terms, ranked by
//!   BM25.
//!
//! Indexes live in RAM, or under `<path>/<index>` when a directory is given.
//! Only one process may write to an on-disk index at a time. Readers reload
//! shortly after any commit, including commits made by another process.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value as _, STORED,
};
use tantivy::tokenizer::{
    AsciiFoldingFilter, Language, LowerCaser, RegexTokenizer, Stemmer, TextAnalyzer, TokenStream,
    WhitespaceTokenizer,
};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info};

use super::{IndexSettings, RawHit, SearchBackend, KEYWORD_ANALYZER, TEXT_ANALYZER};

const SOURCE_FIELD: &str = "_source";
const WRITER_HEAP_BYTES: usize = 20_000_000;
/// Letters, digits, and underscores.
const WORD_PATTERN: &str = r"[\p{L}\p{N}_]+";

pub struct EmbeddedBackend {
    dir: Option<PathBuf>,
    indexes: RwLock<HashMap<String, Arc<EmbeddedIndex>>>,
}

struct EmbeddedIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<Option<IndexWriter>>,
    fields: HashMap<String, Field>,
    source: Field,
}

fn stemmer_language(name: &str) -> Language {
    match name.to_ascii_lowercase().as_str() {
        "french" => Language::French,
        "german" => Language::German,
        "spanish" => Language::Spanish,
        "italian" => Language::Italian,
        "portuguese" => Language::Portuguese,
        "dutch" => Language::Dutch,
        _ => Language::English,
    }
}

fn register_analyzers(index: &Index, language: Language) -> Result<()> {
    let text = TextAnalyzer::builder(RegexTokenizer::new(WORD_PATTERN)?)
        .filter(LowerCaser)
        .filter(Stemmer::new(language))
        .filter(AsciiFoldingFilter)
        .build();
    index.tokenizers().register(TEXT_ANALYZER, text);
    index
        .tokenizers()
        .register(KEYWORD_ANALYZER, TextAnalyzer::from(WhitespaceTokenizer::default()));
    Ok(())
}

fn build_schema(settings: &IndexSettings) -> Schema {
    let mut builder = Schema::builder();
    let indexed = |tokenizer: &str| {
        TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(tokenizer)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
    };
    for name in &settings.text_fields {
        builder.add_text_field(name, indexed(TEXT_ANALYZER));
    }
    for name in &settings.keyword_fields {
        builder.add_text_field(name, indexed(KEYWORD_ANALYZER));
    }
    builder.add_text_field(SOURCE_FIELD, STORED);
    builder.build()
}

impl EmbeddedIndex {
    fn open(index: Index, language: Language) -> Result<Self> {
        register_analyzers(&index, language)?;
        let schema = index.schema();
        let source = schema
            .get_field(SOURCE_FIELD)
            .context("index schema has no _source field")?;
        let fields = schema
            .fields()
            .filter(|(_, entry)| entry.name() != SOURCE_FIELD)
            .map(|(field, entry)| (entry.name().to_string(), field))
            .collect();
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;
        Ok(Self {
            index,
            reader,
            writer: Mutex::new(None),
            fields,
            source,
        })
    }

    fn field(&self, name: &str) -> Result<Field> {
        self.fields
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("field '{}' is not indexed", name))
    }

    fn add(&self, doc: &Value) -> Result<()> {
        let mut document = TantivyDocument::default();
        for (name, field) in &self.fields {
            match doc.get(name) {
                Some(Value::String(s)) => document.add_text(*field, s),
                Some(Value::Null) | None => {}
                Some(other) => document.add_text(*field, other.to_string()),
            }
        }
        document.add_text(self.source, serde_json::to_string(doc)?);

        let mut guard = self
            .writer
            .lock()
            .map_err(|_| anyhow!("index writer lock poisoned"))?;
        if guard.is_none() {
            *guard = Some(self.index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?);
        }
        if let Some(writer) = guard.as_mut() {
            writer.add_document(document)?;
        }
        Ok(())
    }

    fn refresh(&self) -> Result<()> {
        let mut guard = self
            .writer
            .lock()
            .map_err(|_| anyhow!("index writer lock poisoned"))?;
        if let Some(writer) = guard.as_mut() {
            writer.commit()?;
        }
        self.reader.reload()?;
        Ok(())
    }

    /// Release the writer (and its directory lock).
    fn close(&self) -> Result<()> {
        let mut guard = self
            .writer
            .lock()
            .map_err(|_| anyhow!("index writer lock poisoned"))?;
        guard.take();
        Ok(())
    }

    fn run(&self, query: &dyn Query, size: usize) -> Result<Vec<RawHit>> {
        if size == 0 {
            return Ok(vec![]);
        }
        let searcher = self.reader.searcher();
        let top = searcher.search(query, &TopDocs::with_limit(size))?;
        let mut hits = Vec::with_capacity(top.len());
        for (score, address) in top {
            let doc: TantivyDocument = searcher.doc(address)?;
            let raw = doc
                .get_first(self.source)
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow!("stored document without _source"))?;
            hits.push(RawHit {
                score: f64::from(score),
                source: serde_json::from_str(raw)?,
            });
        }
        Ok(hits)
    }

    fn count(&self, query: &dyn Query) -> Result<usize> {
        Ok(self.reader.searcher().search(query, &Count)?)
    }

    /// Distinct analyzed terms of `text` for `field`.
    fn analyze(&self, field: Field, text: &str) -> Result<Vec<String>> {
        let mut analyzer = self.index.tokenizer_for_field(field)?;
        let mut stream = analyzer.token_stream(text);
        let mut terms: Vec<String> = Vec::new();
        while let Some(token) = stream.next() {
            if !terms.contains(&token.text) {
                terms.push(token.text.clone());
            }
        }
        Ok(terms)
    }
}

impl EmbeddedBackend {
    pub fn in_ram() -> Self {
        Self {
            dir: None,
            indexes: RwLock::new(HashMap::new()),
        }
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            indexes: RwLock::new(HashMap::new()),
        }
    }

    fn index_dir(&self, name: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(name))
    }

    fn on_disk(dir: &Path) -> bool {
        dir.join("meta.json").is_file()
    }

    /// Open index `name`, loading it from disk on first access.
    fn get(&self, name: &str) -> Result<Option<Arc<EmbeddedIndex>>> {
        {
            let indexes = self
                .indexes
                .read()
                .map_err(|_| anyhow!("index registry lock poisoned"))?;
            if let Some(idx) = indexes.get(name) {
                return Ok(Some(Arc::clone(idx)));
            }
        }
        let Some(dir) = self.index_dir(name).filter(|d| Self::on_disk(d)) else {
            return Ok(None);
        };
        let mut indexes = self
            .indexes
            .write()
            .map_err(|_| anyhow!("index registry lock poisoned"))?;
        if let Some(idx) = indexes.get(name) {
            return Ok(Some(Arc::clone(idx)));
        }
        debug!(index = name, path = %dir.display(), "opening on-disk index");
        let index = Index::open_in_dir(&dir)
            .with_context(|| format!("Failed to open index at {}", dir.display()))?;
        let idx = Arc::new(EmbeddedIndex::open(index, Language::English)?);
        indexes.insert(name.to_string(), Arc::clone(&idx));
        Ok(Some(idx))
    }

    fn require(&self, name: &str) -> Result<Arc<EmbeddedIndex>> {
        self.get(name)?
            .ok_or_else(|| anyhow!("index '{}' does not exist", name))
    }
}

#[async_trait]
impl SearchBackend for EmbeddedBackend {
    fn kind(&self) -> &'static str {
        "embedded"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.get(index)?.is_some())
    }

    async fn create_index(&self, index: &str, settings: &IndexSettings) -> Result<()> {
        if self.get(index)?.is_some() {
            debug!(index, "index already exists");
            return Ok(());
        }
        let mut indexes = self
            .indexes
            .write()
            .map_err(|_| anyhow!("index registry lock poisoned"))?;
        if indexes.contains_key(index) {
            return Ok(());
        }
        let schema = build_schema(settings);
        let tantivy_index = match self.index_dir(index) {
            Some(dir) => {
                fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create index dir: {}", dir.display()))?;
                Index::create_in_dir(&dir, schema)
                    .with_context(|| format!("Failed to create index at {}", dir.display()))?
            }
            None => Index::create_in_ram(schema),
        };
        let idx = EmbeddedIndex::open(tantivy_index, stemmer_language(&settings.stemmer_language))?;
        indexes.insert(index.to_string(), Arc::new(idx));
        info!(index, "created embedded index");
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let removed = self
            .indexes
            .write()
            .map_err(|_| anyhow!("index registry lock poisoned"))?
            .remove(index);
        if let Some(idx) = removed {
            idx.close()?;
        }
        if let Some(dir) = self.index_dir(index) {
            if dir.exists() {
                fs::remove_dir_all(&dir)
                    .with_context(|| format!("Failed to remove index dir: {}", dir.display()))?;
            }
        }
        Ok(())
    }

    async fn index_document(&self, index: &str, doc: &Value) -> Result<()> {
        self.require(index)?.add(doc)
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        self.require(index)?.refresh()
    }

    async fn term_query(
        &self,
        index: &str,
        field: &str,
        value: &str,
        size: usize,
    ) -> Result<Vec<RawHit>> {
        let idx = self.require(index)?;
        let term = Term::from_field_text(idx.field(field)?, value);
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        if size == 0 {
            // Still validate the field and touch the index.
            idx.count(&query)?;
        }
        idx.run(&query, size)
    }

    async fn match_query(
        &self,
        index: &str,
        field: &str,
        query: &str,
        size: usize,
    ) -> Result<Vec<RawHit>> {
        let idx = self.require(index)?;
        let field = idx.field(field)?;
        let terms = idx.analyze(field, query)?;
        if terms.is_empty() {
            return Ok(vec![]);
        }
        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .iter()
            .map(|t| {
                let q: Box<dyn Query> = Box::new(TermQuery::new(
                    Term::from_field_text(field, t),
                    IndexRecordOption::WithFreqs,
                ));
                (Occur::Should, q)
            })
            .collect();
        idx.run(&BooleanQuery::new(clauses), size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn seeded(backend: &EmbeddedBackend) {
        backend.create_index("rsp", &IndexSettings::default()).await.unwrap();
        for (url, text) in [
            ("https://twitter.com/a/status/1", "hello world"),
            ("https://twitter.com/a/status/2", "Running through the Café"),
            ("https://twitter.com/a/status/3", "hello hello hello again"),
        ] {
            backend
                .index_document("rsp", &json!({"source": "twitter", "url": url, "text": text}))
                .await
                .unwrap();
        }
        backend.refresh("rsp").await.unwrap();
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let backend = EmbeddedBackend::in_ram();
        assert!(!backend.index_exists("rsp").await.unwrap());
        backend.create_index("rsp", &IndexSettings::default()).await.unwrap();
        backend.create_index("rsp", &IndexSettings::default()).await.unwrap();
        assert!(backend.index_exists("rsp").await.unwrap());
    }

    #[tokio::test]
    async fn match_is_analyzed() {
        let backend = EmbeddedBackend::in_ram();
        seeded(&backend).await;

        let hits = backend.match_query("rsp", "text", "HELLO", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(hits[0].source["url"], "https://twitter.com/a/status/3");

        // Stemming and ASCII folding.
        let hits = backend.match_query("rsp", "text", "runs cafe", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source["text"], "Running through the Café");

        assert!(backend.match_query("rsp", "text", "zebra", 10).await.unwrap().is_empty());
        assert!(backend.match_query("rsp", "text", "  ", 10).await.unwrap().is_empty());
        assert!(backend.match_query("rsp", "text", "hello", 0).await.unwrap().is_empty());
        assert_eq!(backend.match_query("rsp", "text", "hello", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn term_is_exact() {
        let backend = EmbeddedBackend::in_ram();
        seeded(&backend).await;

        let hits = backend
            .term_query("rsp", "url", "https://twitter.com/a/status/2", 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(backend
            .term_query("rsp", "url", "https://twitter.com/a/status", 1)
            .await
            .unwrap()
            .is_empty());
        assert!(backend.term_query("rsp", "nope", "x", 1).await.is_err());
    }

    #[tokio::test]
    async fn documents_need_a_refresh() {
        let backend = EmbeddedBackend::in_ram();
        backend.create_index("rsp", &IndexSettings::default()).await.unwrap();
        backend
            .index_document("rsp", &json!({"source": "slack", "url": "", "text": "pending"}))
            .await
            .unwrap();
        assert!(backend.match_query("rsp", "text", "pending", 5).await.unwrap().is_empty());
        backend.refresh("rsp").await.unwrap();
        assert_eq!(backend.match_query("rsp", "text", "pending", 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_drops_everything() {
        let backend = EmbeddedBackend::in_ram();
        seeded(&backend).await;
        backend.delete_index("rsp").await.unwrap();
        backend.delete_index("rsp").await.unwrap();
        assert!(!backend.index_exists("rsp").await.unwrap());
        assert!(backend.index_document("rsp", &json!({"text": "x"})).await.is_err());
    }

    #[tokio::test]
    async fn thread_separator_is_not_searchable() {
        let backend = EmbeddedBackend::in_ram();
        backend.create_index("rsp", &IndexSettings::default()).await.unwrap();
        backend
            .index_document(
                "rsp",
                &json!({"source": "slack", "url": "", "text": "first<NEXT_MESSAGE>second"}),
            )
            .await
            .unwrap();
        backend.refresh("rsp").await.unwrap();

        assert!(backend.match_query("rsp", "text", "message", 5).await.unwrap().is_empty());
        assert!(backend.match_query("rsp", "text", "next", 5).await.unwrap().is_empty());
        assert_eq!(backend.match_query("rsp", "text", "second", 5).await.unwrap().len(), 1);
        assert_eq!(backend.match_query("rsp", "text", "first", 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn readers_see_commits_from_another_handle() {
        let tmp = TempDir::new().unwrap();
        let writer = EmbeddedBackend::in_dir(tmp.path());
        writer.create_index("rsp", &IndexSettings::default()).await.unwrap();

        let reader = EmbeddedBackend::in_dir(tmp.path());
        assert!(reader.index_exists("rsp").await.unwrap());
        assert!(reader.match_query("rsp", "text", "fresh", 5).await.unwrap().is_empty());

        writer
            .index_document("rsp", &json!({"source": "twitter", "url": "u", "text": "fresh news"}))
            .await
            .unwrap();
        writer.refresh("rsp").await.unwrap();

        let mut found = 0;
        for _ in 0..50 {
            found = reader.match_query("rsp", "text", "fresh", 5).await.unwrap().len();
            if found > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        assert_eq!(found, 1);
    }

    #[tokio::test]
    async fn on_disk_index_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let backend = EmbeddedBackend::in_dir(tmp.path());
            seeded(&backend).await;
        }
        assert!(tmp.path().join("rsp").join("meta.json").is_file());

        let backend = EmbeddedBackend::in_dir(tmp.path());
        assert!(backend.index_exists("rsp").await.unwrap());
        let hits = backend.match_query("rsp", "text", "world", 10).await.unwrap();
        assert_eq!(hits.len(), 1);

        backend.delete_index("rsp").await.unwrap();
        assert!(!tmp.path().join("rsp").exists());
    }
}
