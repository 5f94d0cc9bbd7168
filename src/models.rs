//! Core data models used throughout roam-sanity.
//!
//! These types represent the canonical documents and search hits that flow
//! through the ingestion and retrieval pipeline.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::dates::format_display_date;

/// Separator placed between messages of a threaded document's `text`.
pub const THREAD_SEPARATOR: &str = "<NEXT_MESSAGE>";

/// Where a document came from. Selects which optional fields are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "roam-research")]
    RoamResearch,
    #[serde(rename = "twitter")]
    Twitter,
    #[serde(rename = "slack")]
    Slack,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::RoamResearch, Source::Twitter, Source::Slack];

    /// The tag used in serialized documents and as the raw store subdirectory.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::RoamResearch => "roam-research",
            Source::Twitter => "twitter",
            Source::Slack => "slack",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "roam-research" | "roam" => Ok(Source::RoamResearch),
            "twitter" => Ok(Source::Twitter),
            "slack" => Ok(Source::Slack),
            other => bail!(
                "Unknown source: '{}'. Available: roam-research, twitter, slack",
                other
            ),
        }
    }
}

/// Canonical document, one per content item.
///
/// A superset of the fields used by every source. Fields that do not apply
/// to the document's [`Source`] are absent, and anything not modelled here
/// (language, author name, hashtags, ...) is carried in [`extra`](Self::extra).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub source: Source,
    #[serde(default)]
    pub url: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_screen_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsing_time: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Document {
    /// A document with only the required fields set.
    pub fn new(source: Source, url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source,
            url: url.into(),
            text: text.into(),
            title: None,
            database: None,
            author_screen_name: None,
            channel: None,
            create_time: None,
            edit_time: None,
            parsing_time: None,
            extra: BTreeMap::new(),
        }
    }

    /// Date shown to users (`%m/%d/%y`): `edit_time` when it parses, else
    /// `create_time`.
    pub fn display_date(&self) -> Option<String> {
        self.edit_time
            .as_deref()
            .and_then(format_display_date)
            .or_else(|| self.create_time.as_deref().and_then(format_display_date))
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode a document, failing on a missing `text` or an unknown `source`.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// A search result returned from the index: relevance score plus document.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub score: f64,
    pub document: Document,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_tags_round_trip() {
        for source in Source::ALL {
            let parsed: Source = source.as_str().parse().unwrap();
            assert_eq!(parsed, source);
            let json = serde_json::to_value(source).unwrap();
            assert_eq!(json, json!(source.as_str()));
        }
    }

    #[test]
    fn unknown_source_is_rejected() {
        assert!("mastodon".parse::<Source>().is_err());
        let err = Document::from_value(json!({
            "source": "mastodon",
            "url": "https://example.com",
            "text": "hi"
        }));
        assert!(err.is_err());
    }

    #[test]
    fn missing_text_is_rejected() {
        let err = Document::from_value(json!({"source": "twitter", "url": "u"}));
        assert!(err.is_err());
    }

    #[test]
    fn missing_url_defaults_to_empty() {
        let doc = Document::from_value(json!({
            "source": "slack",
            "text": "first",
            "channel": "general"
        }))
        .unwrap();
        assert_eq!(doc.url, "");
    }

    #[test]
    fn extra_fields_pass_through() {
        let raw = json!({
            "source": "twitter",
            "url": "https://twitter.com/a/status/1",
            "text": "hello",
            "author_screen_name": "a",
            "lang": "en",
            "hashtags": ["roamcult"]
        });
        let doc = Document::from_value(raw.clone()).unwrap();
        assert_eq!(doc.extra.get("lang"), Some(&json!("en")));
        assert_eq!(doc.to_value().unwrap(), raw);
    }

    #[test]
    fn absent_optionals_are_not_serialized() {
        let doc = Document::new(Source::Twitter, "u", "t");
        let value = doc.to_value().unwrap();
        let mut keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["source", "text", "url"]);
    }

    #[test]
    fn display_date_prefers_edit_time() {
        let mut doc = Document::new(Source::RoamResearch, "u", "t");
        assert_eq!(doc.display_date(), None);
        doc.create_time = Some("2020-01-01T00:00:00+00:00".into());
        assert_eq!(doc.display_date().as_deref(), Some("01/01/20"));
        doc.edit_time = Some("2021-03-04T00:00:00+00:00".into());
        assert_eq!(doc.display_date().as_deref(), Some("03/04/21"));
    }

    #[test]
    fn unparsable_edit_time_falls_back_to_create_time() {
        let mut doc = Document::new(Source::Slack, "u", "t");
        doc.create_time = Some("2020-01-01T00:00:00+00:00".into());
        doc.edit_time = Some("yesterday".into());
        assert_eq!(doc.display_date().as_deref(), Some("01/01/20"));
    }
}
