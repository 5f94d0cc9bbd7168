//! Elasticsearch backend over its REST API.
//!
//! Every call is a single HTTP request; retries are the caller's business
//! (see [`crate::retry`]). A non-success status becomes an error carrying the
//! status and response body, except for the "already exists" and "missing"
//! answers that index creation and deletion treat as success.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use super::{IndexSettings, RawHit, SearchBackend};

pub struct ElasticsearchBackend {
    client: Client,
    base_url: String,
}

impl ElasticsearchBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn search(&self, index: &str, body: Value) -> Result<Vec<RawHit>> {
        let resp = self
            .client
            .post(self.url(&format!("{}/_search", index)))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Search request to index '{}' failed", index))?;
        let json: Value = check(resp, "search").await?.json().await?;
        parse_hits(&json)
    }
}

/// Turn a non-success response into an error with its status and body.
async fn check(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    bail!("Elasticsearch {} failed with {}: {}", what, status, body)
}

fn parse_hits(json: &Value) -> Result<Vec<RawHit>> {
    let hits = json
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Elasticsearch response has no hits.hits array"))?;
    hits.iter()
        .map(|hit| {
            let source = hit
                .get("_source")
                .cloned()
                .ok_or_else(|| anyhow!("Elasticsearch hit without _source"))?;
            Ok(RawHit {
                score: hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0),
                source,
            })
        })
        .collect()
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    fn kind(&self) -> &'static str {
        "elasticsearch"
    }

    async fn ping(&self) -> Result<()> {
        let resp = self
            .client
            .get(self.url("/"))
            .send()
            .await
            .with_context(|| format!("Elasticsearch unreachable at {}", self.base_url))?;
        check(resp, "ping").await?;
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let resp = self.client.head(self.url(index)).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => bail!("Elasticsearch index check for '{}' failed with {}", index, s),
        }
    }

    async fn create_index(&self, index: &str, settings: &IndexSettings) -> Result<()> {
        let resp = self
            .client
            .put(self.url(index))
            .json(&settings.to_elasticsearch())
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST && body.contains("resource_already_exists_exception") {
            debug!(index, "index already exists");
            return Ok(());
        }
        bail!("Elasticsearch create index '{}' failed with {}: {}", index, status, body)
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let resp = self.client.delete(self.url(index)).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
                debug!(index, status = %resp.status(), "delete ignored");
                Ok(())
            }
            _ => check(resp, "delete index").await.map(|_| ()),
        }
    }

    async fn index_document(&self, index: &str, doc: &Value) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("{}/_doc", index)))
            .json(doc)
            .send()
            .await?;
        check(resp, "index document").await?;
        Ok(())
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("{}/_refresh", index)))
            .send()
            .await?;
        check(resp, "refresh").await?;
        Ok(())
    }

    async fn term_query(
        &self,
        index: &str,
        field: &str,
        value: &str,
        size: usize,
    ) -> Result<Vec<RawHit>> {
        let body = json!({
            "query": {"bool": {"must": [{"term": {field: value}}]}},
            "size": size
        });
        self.search(index, body).await
    }

    async fn match_query(
        &self,
        index: &str,
        field: &str,
        query: &str,
        size: usize,
    ) -> Result<Vec<RawHit>> {
        let body = json!({
            "query": {"match": {field: {"query": query, "fuzziness": 0}}},
            "size": size
        });
        self.search(index, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> ElasticsearchBackend {
        ElasticsearchBackend::new(&format!("{}/", server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn ping_and_exists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tagline": "You Know, for Search"})))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/rsp"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/other"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let es = backend(&server);
        es.ping().await.unwrap();
        assert!(es.index_exists("rsp").await.unwrap());
        assert!(!es.index_exists("other").await.unwrap());
    }

    #[tokio::test]
    async fn ping_fails_on_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("starting"))
            .mount(&server)
            .await;
        let err = backend(&server).ping().await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn create_sends_settings_and_tolerates_existing() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/rsp"))
            .and(body_json(IndexSettings::default().to_elasticsearch()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/taken"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"type": "resource_already_exists_exception"},
                "status": 400
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"type": "illegal_argument_exception"}
            })))
            .mount(&server)
            .await;

        let es = backend(&server);
        let settings = IndexSettings::default();
        es.create_index("rsp", &settings).await.unwrap();
        es.create_index("taken", &settings).await.unwrap();
        assert!(es.create_index("broken", &settings).await.is_err());
    }

    #[tokio::test]
    async fn delete_ignores_missing() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/locked"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let es = backend(&server);
        es.delete_index("gone").await.unwrap();
        assert!(es.delete_index("locked").await.is_err());
    }

    #[tokio::test]
    async fn index_and_refresh() {
        let server = MockServer::start().await;
        let doc = json!({"source": "twitter", "url": "u", "text": "hello"});
        Mock::given(method("POST"))
            .and(path("/rsp/_doc"))
            .and(body_json(doc.clone()))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"result": "created"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rsp/_refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let es = backend(&server);
        es.index_document("rsp", &doc).await.unwrap();
        es.refresh("rsp").await.unwrap();
    }

    #[tokio::test]
    async fn match_query_body_and_hits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rsp/_search"))
            .and(body_json(json!({
                "query": {"match": {"text": {"query": "hello", "fuzziness": 0}}},
                "size": 3
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": {"total": {"value": 2}, "hits": [
                    {"_score": 2.5, "_source": {"source": "twitter", "url": "a", "text": "hello"}},
                    {"_score": 1.0, "_source": {"source": "twitter", "url": "b", "text": "hello you"}}
                ]}
            })))
            .mount(&server)
            .await;

        let hits = backend(&server).match_query("rsp", "text", "hello", 3).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].score, 2.5);
        assert_eq!(hits[1].source["url"], "b");
    }

    #[tokio::test]
    async fn term_query_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rsp/_search"))
            .and(body_json(json!({
                "query": {"bool": {"must": [{"term": {"url": "https://x/1"}}]}},
                "size": 1
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hits": {"hits": []}})))
            .mount(&server)
            .await;

        let hits = backend(&server).term_query("rsp", "url", "https://x/1", 1).await.unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn malformed_search_response_is_an_error() {
        assert!(parse_hits(&json!({"took": 1})).is_err());
        assert!(parse_hits(&json!({"hits": {"hits": [{"_score": 1.0}]}})).is_err());
    }
}
