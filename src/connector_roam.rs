//! Roam Research connector.
//!
//! Normalizes pages of a Roam JSON export. Each page's outline (nested
//! blocks) is flattened into `<ul><li>…</li></ul>` markup that becomes the
//! searchable `text`; the page title is kept for display.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::dates::epoch_millis_to_iso;
use crate::models::{Document, Source};
use crate::normalize::{optional_str, required_str, Normalizer};

pub struct RoamNormalizer {
    database: String,
}

impl RoamNormalizer {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
        }
    }

    pub fn page_url(&self, uid: &str) -> String {
        format!(
            "https://roamresearch.com/#/app/{}/page/{}",
            self.database, uid
        )
    }
}

impl Normalizer for RoamNormalizer {
    fn source(&self) -> Source {
        Source::RoamResearch
    }

    fn normalize(&self, raw: &Value, parsing_time: &str) -> Result<Vec<Document>> {
        let uid = match optional_str(raw, "uid") {
            Some(uid) if !uid.is_empty() => uid,
            _ => return Ok(vec![]),
        };
        let title = required_str(raw, "title")?;
        let children = children_of(raw)?;
        if !has_text(children)? {
            return Ok(vec![]);
        }

        let mut doc = Document::new(Source::RoamResearch, self.page_url(uid), render_page(children)?);
        doc.title = Some(title.to_string());
        doc.database = Some(self.database.clone());
        doc.parsing_time = Some(parsing_time.to_string());
        doc.create_time = millis_field(raw, "create-time")?;
        doc.edit_time = millis_field(raw, "edit-time")?;

        Ok(vec![doc])
    }
}

fn children_of(node: &Value) -> Result<&[Value]> {
    match node.get("children") {
        None | Some(Value::Null) => Ok(&[] as &[Value]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => bail!("'children' must be an array"),
    }
}

fn block_string(block: &Value) -> &str {
    optional_str(block, "string").unwrap_or("")
}

fn has_text(blocks: &[Value]) -> Result<bool> {
    for block in blocks {
        if !block_string(block).trim().is_empty() || has_text(children_of(block)?)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn render_list(blocks: &[Value], out: &mut String) -> Result<()> {
    if blocks.is_empty() {
        return Ok(());
    }
    out.push_str("<ul>");
    for block in blocks {
        out.push_str("<li>");
        out.push_str(block_string(block));
        render_list(children_of(block)?, out)?;
        out.push_str("</li>");
    }
    out.push_str("</ul>");
    Ok(())
}

fn render_page(blocks: &[Value]) -> Result<String> {
    let mut out = String::new();
    render_list(blocks, &mut out)?;
    Ok(out)
}

fn millis_field(raw: &Value, key: &str) -> Result<Option<String>> {
    match raw.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_i64() {
            Some(ms) => epoch_millis_to_iso(ms).map(Some),
            None => bail!("'{}' must be an integer (epoch milliseconds)", key),
        },
    }
}
