//! Slack connector.
//!
//! One raw record is one thread: a channel plus its messages in order. The
//! messages are folded into a single document whose `text` joins them with
//! [`THREAD_SEPARATOR`].

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;

use crate::dates::epoch_secs_to_iso;
use crate::models::{Document, Source, THREAD_SEPARATOR};
use crate::normalize::{optional_str, required_str, Normalizer};

/// Suffix Slack appends to edited messages.
const EDITED_MARKER: &str = "\u{a0}(edited)\u{a0}";

pub struct SlackNormalizer;

struct Message<'a> {
    text: String,
    ts: Option<&'a Value>,
    url: Option<&'a str>,
}

impl Normalizer for SlackNormalizer {
    fn source(&self) -> Source {
        Source::Slack
    }

    fn normalize(&self, raw: &Value, parsing_time: &str) -> Result<Vec<Document>> {
        let channel = required_str(raw, "channel")?;

        let mut doc = match raw.get("messages") {
            Some(Value::Array(items)) => match thread_document(items)? {
                Some(doc) => doc,
                None => return Ok(vec![]),
            },
            Some(_) => bail!("'messages' must be an array"),
            None => match aggregated_document(raw)? {
                Some(doc) => doc,
                None => return Ok(vec![]),
            },
        };
        doc.channel = Some(channel.to_string());
        doc.parsing_time = Some(parsing_time.to_string());
        Ok(vec![doc])
    }
}

fn thread_document(items: &[Value]) -> Result<Option<Document>> {
    let messages: Vec<Message<'_>> = items
        .iter()
        .filter_map(|m| {
            let text = clean_up_text(optional_str(m, "text")?);
            (!text.is_empty()).then(|| Message {
                text,
                ts: m.get("ts"),
                url: optional_str(m, "url").or_else(|| optional_str(m, "permalink")),
            })
        })
        .collect();

    let Some(first) = messages.first() else {
        return Ok(None);
    };
    let create_time = first.ts.map(ts_to_iso).transpose()?;
    let url = first.url.unwrap_or_default().to_string();
    let text = messages
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join(THREAD_SEPARATOR);

    let mut doc = Document::new(Source::Slack, url, text);
    doc.create_time = create_time;
    Ok(Some(doc))
}

/// A thread already flattened into `text`, as older crawls stored it.
fn aggregated_document(raw: &Value) -> Result<Option<Document>> {
    let text = required_str(raw, "text")?;
    let text = text
        .split(THREAD_SEPARATOR)
        .map(clean_up_text)
        .filter(|m| !m.is_empty())
        .collect::<Vec<_>>()
        .join(THREAD_SEPARATOR);
    if text.is_empty() {
        return Ok(None);
    }
    let mut doc = Document::new(Source::Slack, optional_str(raw, "url").unwrap_or_default(), text);
    doc.create_time = optional_str(raw, "create_time").map(str::to_string);
    Ok(Some(doc))
}

fn clean_up_text(text: &str) -> String {
    text.strip_suffix(EDITED_MARKER)
        .unwrap_or(text)
        .trim_matches(|c| c == ' ' || c == '\n')
        .to_string()
}

/// Slack timestamps are epoch seconds, as a number or a `"1600000000.000100"` string.
fn ts_to_iso(ts: &Value) -> Result<String> {
    let secs = match ts {
        Value::Number(n) => n.as_f64().ok_or_else(|| anyhow!("invalid ts: {}", n))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .with_context(|| format!("invalid ts: {}", s))?,
        other => bail!("invalid ts: {}", other),
    };
    epoch_secs_to_iso(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: &str = "2021-05-01T00:00:00+00:00";

    #[test]
    fn thread_becomes_one_document() {
        let raw = json!({
            "channel": "general",
            "messages": [
                {"text": "first\u{a0}(edited)\u{a0}", "ts": "1600000000.000100",
                 "permalink": "https://roamresearch.slack.com/archives/C1/p1600000000000100",
                 "author": "ana"},
                {"text": "", "ts": 1600000001.0},
                {"ts": 1600000002.0},
                {"text": " second\n", "ts": 1600000003.0, "author": "bo"}
            ]
        });
        let docs = SlackNormalizer.normalize(&raw, NOW).unwrap();
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc.source, Source::Slack);
        assert_eq!(doc.text, "first<NEXT_MESSAGE>second");
        assert_eq!(doc.channel.as_deref(), Some("general"));
        assert_eq!(
            doc.url,
            "https://roamresearch.slack.com/archives/C1/p1600000000000100"
        );
        assert_eq!(
            doc.create_time.as_deref(),
            Some("2020-09-13T12:26:40.000100+00:00")
        );
    }

    #[test]
    fn empty_threads_yield_nothing() {
        let raw = json!({"channel": "general", "messages": [{"text": "  "}]});
        assert!(SlackNormalizer.normalize(&raw, NOW).unwrap().is_empty());
        let raw = json!({"channel": "general", "messages": []});
        assert!(SlackNormalizer.normalize(&raw, NOW).unwrap().is_empty());
    }

    #[test]
    fn missing_url_is_empty() {
        let raw = json!({"channel": "c", "messages": [{"text": "hi", "ts": 1.0}]});
        let docs = SlackNormalizer.normalize(&raw, NOW).unwrap();
        assert_eq!(docs[0].url, "");
    }

    #[test]
    fn pre_aggregated_threads_are_accepted() {
        let raw = json!({
            "source": "slack",
            "channel": "help",
            "text": "q?\u{a0}(edited)\u{a0}<NEXT_MESSAGE>a!",
            "url": "https://roamresearch.slack.com/archives/C2/p1",
            "create_time": "2020-09-13T12:26:40+00:00"
        });
        let docs = SlackNormalizer.normalize(&raw, NOW).unwrap();
        assert_eq!(docs[0].text, "q?<NEXT_MESSAGE>a!");
        assert_eq!(docs[0].create_time.as_deref(), Some("2020-09-13T12:26:40+00:00"));
    }

    #[test]
    fn malformed_threads_fail() {
        assert!(SlackNormalizer
            .normalize(&json!({"messages": [{"text": "hi"}]}), NOW)
            .is_err());
        assert!(SlackNormalizer
            .normalize(&json!({"channel": "c", "messages": {}}), NOW)
            .is_err());
        assert!(SlackNormalizer
            .normalize(&json!({"channel": "c", "messages": [{"text": "hi", "ts": "later"}]}), NOW)
            .is_err());
    }

    #[test]
    fn normalizing_twice_is_identical() {
        let raw = json!({
            "channel": "general",
            "messages": [
                {"text": "first\u{a0}(edited)\u{a0}", "ts": "1600000000.000100",
                 "permalink": "https://roamresearch.slack.com/archives/C1/p1"},
                {"text": "second", "ts": 1600000003.0}
            ]
        });
        let strip = |mut d: Document| {
            d.parsing_time = None;
            d
        };
        let a = SlackNormalizer.normalize(&raw, NOW).unwrap();
        let b = SlackNormalizer
            .normalize(&raw, "2022-01-01T00:00:00+00:00")
            .unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(
            a.into_iter().map(strip).collect::<Vec<_>>(),
            b.into_iter().map(strip).collect::<Vec<_>>()
        );
    }
}
