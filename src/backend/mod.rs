//! Search backend abstraction.
//!
//! The [`SearchBackend`] trait is the small index/query surface the rest of
//! the crate needs from a text-search engine. The index manager only talks to
//! this trait, so the engine behind it can be swapped by configuration:
//!
//! | Backend | Engine | Use |
//! |---------|--------|-----|
//! | [`ElasticsearchBackend`] | Elasticsearch over HTTP | deployments |
//! | [`EmbeddedBackend`] | tantivy, in RAM or on disk | single-machine use, tests |
//!
//! Implementations must be `Send + Sync` to be shared across request handlers.

pub mod elasticsearch;
pub mod embedded;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{BackendConfig, BackendKind};

pub use elasticsearch::ElasticsearchBackend;
pub use embedded::EmbeddedBackend;

/// Name of the custom analyzer applied to document text.
pub const TEXT_ANALYZER: &str = "tags_analyzer";

/// Analyzer used for exact-token fields (`url`, `source`).
pub const KEYWORD_ANALYZER: &str = "whitespace";

/// A raw hit: backend relevance score plus the stored JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub score: f64,
    pub source: Value,
}

/// Analysis configuration of the document index.
///
/// `text` goes through [`TEXT_ANALYZER`] (standard tokenizer, lowercase,
/// stemming, ASCII folding) at both index and search time; `url` and
/// `source` are split on whitespace only so that term lookups are exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSettings {
    pub stemmer_language: String,
    pub text_fields: Vec<String>,
    pub keyword_fields: Vec<String>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            stemmer_language: "english".to_string(),
            text_fields: vec!["text".to_string()],
            keyword_fields: vec!["url".to_string(), "source".to_string()],
        }
    }
}

impl IndexSettings {
    /// Index creation body for Elasticsearch (`PUT /<index>`).
    pub fn to_elasticsearch(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for field in &self.text_fields {
            properties.insert(field.clone(), text_mapping(TEXT_ANALYZER));
        }
        for field in &self.keyword_fields {
            properties.insert(field.clone(), text_mapping(KEYWORD_ANALYZER));
        }
        json!({
            "settings": {
                "analysis": {
                    "filter": {
                        "filter_stemmer": {
                            "type": "stemmer",
                            "language": self.stemmer_language
                        }
                    },
                    "analyzer": {
                        TEXT_ANALYZER: {
                            "type": "custom",
                            "filter": ["lowercase", "filter_stemmer", "asciifolding"],
                            "tokenizer": "standard"
                        }
                    }
                }
            },
            "mappings": { "properties": properties }
        })
    }
}

fn text_mapping(analyzer: &str) -> Value {
    json!({
        "type": "text",
        "analyzer": analyzer,
        "search_analyzer": analyzer,
        "index": true
    })
}

/// Minimal index/query API of a text-search engine.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ping`](SearchBackend::ping) | Liveness probe |
/// | [`index_exists`](SearchBackend::index_exists) | Does the named index exist |
/// | [`create_index`](SearchBackend::create_index) | Create with settings; "already exists" is success |
/// | [`delete_index`](SearchBackend::delete_index) | Drop; "missing" is success |
/// | [`index_document`](SearchBackend::index_document) | Append one JSON document |
/// | [`refresh`](SearchBackend::refresh) | Make appended documents searchable |
/// | [`term_query`](SearchBackend::term_query) | Exact lookup on an unanalyzed-token field |
/// | [`match_query`](SearchBackend::match_query) | Analyzed full-text match, best first |
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Short name used in logs (`elasticsearch`, `embedded`).
    fn kind(&self) -> &'static str;

    async fn ping(&self) -> Result<()>;

    async fn index_exists(&self, index: &str) -> Result<bool>;

    async fn create_index(&self, index: &str, settings: &IndexSettings) -> Result<()>;

    async fn delete_index(&self, index: &str) -> Result<()>;

    async fn index_document(&self, index: &str, doc: &Value) -> Result<()>;

    async fn refresh(&self, index: &str) -> Result<()>;

    async fn term_query(&self, index: &str, field: &str, value: &str, size: usize)
        -> Result<Vec<RawHit>>;

    async fn match_query(&self, index: &str, field: &str, query: &str, size: usize)
        -> Result<Vec<RawHit>>;
}

/// Build the backend selected by configuration.
pub fn build_backend(config: &BackendConfig) -> Result<Arc<dyn SearchBackend>> {
    Ok(match config.kind {
        BackendKind::Elasticsearch => Arc::new(ElasticsearchBackend::new(
            &config.url,
            Duration::from_secs(config.timeout_secs),
        )?),
        BackendKind::Embedded => match &config.path {
            Some(path) => Arc::new(EmbeddedBackend::in_dir(path)),
            None => Arc::new(EmbeddedBackend::in_ram()),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elasticsearch_settings_payload() {
        let body = IndexSettings::default().to_elasticsearch();
        let analyzer = &body["settings"]["analysis"]["analyzer"]["tags_analyzer"];
        assert_eq!(analyzer["tokenizer"], "standard");
        assert_eq!(
            analyzer["filter"],
            json!(["lowercase", "filter_stemmer", "asciifolding"])
        );
        assert_eq!(
            body["settings"]["analysis"]["filter"]["filter_stemmer"],
            json!({"type": "stemmer", "language": "english"})
        );

        let props = &body["mappings"]["properties"];
        assert_eq!(props["text"]["analyzer"], "tags_analyzer");
        assert_eq!(props["text"]["search_analyzer"], "tags_analyzer");
        for field in ["url", "source"] {
            assert_eq!(props[field]["type"], "text");
            assert_eq!(props[field]["analyzer"], "whitespace");
            assert_eq!(props[field]["index"], true);
        }
    }

    #[test]
    fn builds_configured_backend() {
        let mut config = BackendConfig::default();
        config.kind = BackendKind::Embedded;
        assert_eq!(build_backend(&config).unwrap().kind(), "embedded");
        config.kind = BackendKind::Elasticsearch;
        assert_eq!(build_backend(&config).unwrap().kind(), "elasticsearch");
    }
}
