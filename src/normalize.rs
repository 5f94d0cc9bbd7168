//! Normalization of raw crawler output into canonical [`Document`]s.
//!
//! Each source has its own [`Normalizer`] (see [`connector_roam`],
//! [`connector_twitter`], [`connector_slack`]). Adapters never look at
//! another source's shape.
//!
//! [`normalize_batch`] drives an adapter over many raw records. A record that
//! fails to normalize is logged and skipped; it never aborts the batch.
//!
//! [`connector_roam`]: crate::connector_roam
//! [`connector_twitter`]: crate::connector_twitter
//! [`connector_slack`]: crate::connector_slack

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::connector_roam::RoamNormalizer;
use crate::connector_slack::SlackNormalizer;
use crate::connector_twitter::TwitterNormalizer;
use crate::models::{Document, Source};

/// Maps one raw record of a given source to zero or more documents.
///
/// Returning an empty vector means "nothing to keep" (e.g. a Roam page with
/// no body); returning an error means the record is malformed.
pub trait Normalizer: Send + Sync {
    fn source(&self) -> Source;

    fn normalize(&self, raw: &Value, parsing_time: &str) -> Result<Vec<Document>>;
}

/// Build the normalizer for `source`.
///
/// `database` names the Roam database the pages belong to; it is required
/// for Roam and ignored otherwise.
pub fn normalizer_for(source: Source, database: Option<&str>) -> Result<Box<dyn Normalizer>> {
    Ok(match source {
        Source::RoamResearch => {
            let database =
                database.ok_or_else(|| anyhow!("a database name is required for Roam pages"))?;
            Box::new(RoamNormalizer::new(database))
        }
        Source::Twitter => Box::new(TwitterNormalizer),
        Source::Slack => Box::new(SlackNormalizer),
    })
}

/// Outcome of [`normalize_batch`].
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub documents: Vec<Document>,
    /// Records that produced no document without being malformed.
    pub skipped: usize,
    /// Records that failed to normalize.
    pub failed: usize,
}

/// Normalize every record, logging and counting the ones that fail.
pub fn normalize_batch<I>(normalizer: &dyn Normalizer, records: I, parsing_time: &str) -> NormalizedBatch
where
    I: IntoIterator<Item = Value>,
{
    let mut batch = NormalizedBatch::default();
    for (i, raw) in records.into_iter().enumerate() {
        match normalizer.normalize(&raw, parsing_time) {
            Ok(docs) if docs.is_empty() => {
                debug!(source = %normalizer.source(), record = i, "record skipped");
                batch.skipped += 1;
            }
            Ok(docs) => batch.documents.extend(docs),
            Err(e) => {
                warn!(
                    source = %normalizer.source(),
                    record = i,
                    error = %e,
                    "failed to normalize record"
                );
                batch.failed += 1;
            }
        }
    }
    batch
}

/// Split a raw input file into records.
///
/// Accepts a JSON array, a single JSON object, or JSON Lines. With JSON
/// Lines, an unparseable line is logged and skipped.
pub fn parse_records(content: &str) -> Result<Vec<Value>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<Value>>(trimmed)
            .context("Failed to parse JSON array of records");
    }

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(vec![value]);
    }

    let mut records = Vec::new();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => records.push(value),
            Err(e) => warn!(line = n + 1, error = %e, "skipping unparseable JSON line"),
        }
    }
    Ok(records)
}

// ============ Field access helpers shared by the connectors ============

pub(crate) fn required_str<'a>(raw: &'a Value, key: &str) -> Result<&'a str> {
    raw.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing or non-string field '{}'", key))
}

pub(crate) fn optional_str<'a>(raw: &'a Value, key: &str) -> Option<&'a str> {
    raw.get(key).and_then(Value::as_str)
}

/// String-or-number identifier (`id`, `user_id`, ...) as a string.
pub(crate) fn id_string(raw: &Value, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Copy `from` into `doc.extra[to]` when present and not null.
pub(crate) fn pass_through(doc: &mut Document, raw: &Value, from: &str, to: &str) {
    if let Some(value) = raw.get(from) {
        if !value.is_null() {
            doc.extra.insert(to.to_string(), value.clone());
        }
    }
}
