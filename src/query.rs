//! Query service: paginated, rendered search.
//!
//! A page is served by asking the index for the first
//! `min(results_max, offset + batch_size)` hits and keeping those from
//! `offset` on. Each page therefore re-runs the query; the index's relevance
//! order is kept as-is.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::config::{Config, QueryConfig};
use crate::index::{connect_index, IndexManager};
use crate::models::SearchHit;
use crate::render::{formatter_for, render_result, truncate_excerpt, RenderedResult};

/// One batch of rendered results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub results: Vec<RenderedResult>,
}

impl SearchPage {
    pub fn n_results(&self) -> usize {
        self.results.len()
    }

    pub fn html(&self) -> String {
        self.results
            .iter()
            .map(RenderedResult::to_html)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_response(&self) -> SearchResponse {
        SearchResponse {
            html: self.html(),
            n_results: self.n_results(),
        }
    }
}

/// JSON body of `GET /search`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchResponse {
    pub html: String,
    pub n_results: usize,
}

pub struct QueryService {
    index: Arc<IndexManager>,
    settings: QueryConfig,
}

impl QueryService {
    pub fn new(index: Arc<IndexManager>, settings: QueryConfig) -> Self {
        Self { index, settings }
    }

    pub fn settings(&self) -> &QueryConfig {
        &self.settings
    }

    /// The hits of one page, in relevance order.
    pub async fn page_hits(&self, query: &str, offset: usize) -> Result<Vec<SearchHit>> {
        if offset >= self.settings.results_max || query.trim().is_empty() {
            return Ok(vec![]);
        }
        let k = self
            .settings
            .results_max
            .min(offset.saturating_add(self.settings.batch_size));
        let hits = self.index.search(query, k).await?;
        debug!(query, offset, k, hits = hits.len(), "search");
        Ok(hits.into_iter().skip(offset).collect())
    }

    pub async fn serve_search(&self, query: &str, offset: usize) -> Result<SearchPage> {
        let results = self
            .page_hits(query, offset)
            .await?
            .iter()
            .map(|hit| render_result(&hit.document, self.settings.excerpt_chars))
            .collect::<Result<Vec<_>>>()?;
        Ok(SearchPage { results })
    }
}

/// `rsp search "<query>"`: print one page of results.
pub async fn run_search(config: &Config, query: &str, offset: usize, html: bool) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    let index = connect_index(config).await?;
    let service = QueryService::new(Arc::new(index), config.query.clone());

    if html {
        let page = service.serve_search(query, offset).await?;
        println!("{}", serde_json::to_string_pretty(&page.to_response())?);
        return Ok(());
    }

    let hits = service.page_hits(query, offset).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        let doc = &hit.document;
        let formatter = formatter_for(doc.source);
        let title = formatter.title(doc).unwrap_or_else(|_| "(untitled)".to_string());
        let date = doc.display_date().unwrap_or_default();
        let excerpt = match formatter.short_excerpt(doc) {
            "" => doc.text.as_str(),
            short => short,
        };

        println!("{}. [{:.2}] {} / {}", offset + i + 1, hit.score, doc.source, title);
        println!("    date: {}", date);
        if !doc.url.is_empty() {
            println!("    url: {}", doc.url);
        }
        println!(
            "    excerpt: \"{}\"",
            truncate_excerpt(excerpt, config.query.excerpt_chars)
                .replace('\n', " ")
                .trim()
        );
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EmbeddedBackend;
    use crate::models::{Document, Source};

    async fn service(n: usize, settings: QueryConfig) -> QueryService {
        let index = IndexManager::new(Arc::new(EmbeddedBackend::in_ram()), "rsp");
        index.ensure().await.unwrap();
        for i in 0..n {
            let mut doc = Document::new(
                Source::Twitter,
                format!("https://twitter.com/a/status/{}", i),
                // Longer texts score lower, so hit order is deterministic.
                format!("roam{}", " tip".repeat(i)),
            );
            doc.author_screen_name = Some("a".into());
            index.add(&doc).await.unwrap();
        }
        QueryService::new(Arc::new(index), settings)
    }

    fn small() -> QueryConfig {
        QueryConfig {
            results_max: 5,
            batch_size: 2,
            excerpt_chars: 200,
        }
    }

    #[tokio::test]
    async fn pages_are_slices_of_the_ranking() {
        let svc = service(6, small()).await;
        let all = svc.index.search("roam", 5).await.unwrap();
        let urls: Vec<&str> = all.iter().map(|h| h.document.url.as_str()).collect();

        let first = svc.serve_search("roam", 0).await.unwrap();
        assert_eq!(first.n_results(), 2);
        assert_eq!(first.results[0].url, urls[0]);
        assert_eq!(first.results[1].url, urls[1]);

        let second = svc.serve_search("roam", 2).await.unwrap();
        assert_eq!(second.n_results(), 2);
        assert_eq!(second.results[0].url, urls[2]);

        // Capped by results_max: hits 4..5 only.
        let last = svc.serve_search("roam", 4).await.unwrap();
        assert_eq!(last.n_results(), 1);
        assert_eq!(last.results[0].url, urls[4]);

        assert_eq!(svc.serve_search("roam", 5).await.unwrap().n_results(), 0);
        assert_eq!(svc.serve_search("roam", 500).await.unwrap().n_results(), 0);
    }

    #[tokio::test]
    async fn blank_and_unmatched_queries() {
        let svc = service(2, QueryConfig::default()).await;
        assert_eq!(svc.serve_search("", 0).await.unwrap(), SearchPage::default());
        assert_eq!(svc.serve_search("   ", 0).await.unwrap().n_results(), 0);
        let page = svc.serve_search("zebra", 0).await.unwrap();
        assert_eq!(page.to_response(), SearchResponse { html: String::new(), n_results: 0 });
    }

    #[tokio::test]
    async fn html_joins_fragments() {
        let svc = service(3, QueryConfig::default()).await;
        let page = svc.serve_search("roam", 0).await.unwrap();
        assert_eq!(page.n_results(), 3);
        let html = page.html();
        assert_eq!(html.matches("<div class='search_result'>").count(), 3);
        assert_eq!(html, page.results.iter().map(|r| r.to_html()).collect::<Vec<_>>().join("\n"));
    }
}
