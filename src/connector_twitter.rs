//! Twitter connector.
//!
//! Two raw shapes reach this adapter:
//!
//! | Shape | Recognized by | Produced by |
//! |-------|---------------|-------------|
//! | API | `user` object | the Twitter REST API (`tweet_mode=extended`) |
//! | Scraped | `tweet` + `username` | the timeline/search scraper (JSON Lines) |
//!
//! Both normalize to the same canonical fields. Retweets are replaced by the
//! tweet they retweet, and a quoted tweet is emitted as an extra document.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat};
use serde_json::Value;
use tracing::{debug, warn};

use crate::dates::{epoch_millis_to_iso, twitter_api_date_to_iso};
use crate::models::{Document, Source};
use crate::normalize::{id_string, optional_str, pass_through, required_str, Normalizer};

pub struct TwitterNormalizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TweetShape {
    Api,
    Scraped,
}

fn detect_shape(raw: &Value) -> Result<TweetShape> {
    if raw.get("tweet").is_some() && raw.get("username").is_some() {
        Ok(TweetShape::Scraped)
    } else if raw.get("user").is_some_and(Value::is_object) {
        Ok(TweetShape::Api)
    } else {
        bail!("unrecognized tweet shape (expected an API or scraped tweet)")
    }
}

pub fn tweet_url(screen_name: &str, id: &str) -> String {
    format!("https://twitter.com/{}/status/{}", screen_name, id)
}

impl Normalizer for TwitterNormalizer {
    fn source(&self) -> Source {
        Source::Twitter
    }

    fn normalize(&self, raw: &Value, parsing_time: &str) -> Result<Vec<Document>> {
        match detect_shape(raw)? {
            TweetShape::Api => normalize_api(raw, parsing_time),
            TweetShape::Scraped => normalize_scraped(raw, parsing_time),
        }
    }
}

fn embedded<'a>(raw: &'a Value, key: &str) -> Option<&'a Value> {
    raw.get(key).filter(|v| v.is_object())
}

/// Append the quoted tweet, if any. A broken quote never drops the quoting tweet.
fn push_quoted(raw: &Value, parsing_time: &str, docs: &mut Vec<Document>) {
    if let Some(quoted) = embedded(raw, "quoted_status") {
        match api_tweet(quoted, parsing_time) {
            Ok(doc) => docs.push(doc),
            Err(e) => warn!(error = %e, "skipping malformed quoted tweet"),
        }
    }
}

fn normalize_api(raw: &Value, parsing_time: &str) -> Result<Vec<Document>> {
    if let Some(original) = embedded(raw, "retweeted_status") {
        return normalize_api(original, parsing_time);
    }
    let mut docs = vec![api_tweet(raw, parsing_time)?];
    push_quoted(raw, parsing_time, &mut docs);
    Ok(docs)
}

fn api_tweet(raw: &Value, parsing_time: &str) -> Result<Document> {
    let id = id_string(raw, "id_str")
        .or_else(|| id_string(raw, "id"))
        .ok_or_else(|| anyhow!("missing tweet id"))?;
    let text = optional_str(raw, "full_text")
        .or_else(|| optional_str(raw, "text"))
        .ok_or_else(|| anyhow!("missing tweet text"))?;
    let user = raw
        .get("user")
        .ok_or_else(|| anyhow!("missing tweet user"))?;
    let screen_name = required_str(user, "screen_name")?;
    let created_at = twitter_api_date_to_iso(required_str(raw, "created_at")?)?;

    let mut doc = Document::new(Source::Twitter, tweet_url(screen_name, &id), text.trim());
    doc.author_screen_name = Some(screen_name.to_string());
    doc.create_time = Some(created_at);
    doc.parsing_time = Some(parsing_time.to_string());
    doc.extra.insert("id".into(), Value::String(id));
    pass_through(&mut doc, user, "name", "author_name");
    pass_through(&mut doc, raw, "lang", "lang");
    pass_through(&mut doc, raw, "in_reply_to_screen_name", "in_reply_to");
    Ok(doc)
}

fn normalize_scraped(raw: &Value, parsing_time: &str) -> Result<Vec<Document>> {
    let mut docs = Vec::new();

    if raw.get("retweet").and_then(Value::as_bool).unwrap_or(false) {
        match embedded(raw, "retweeted_status") {
            Some(original) => docs.extend(normalize_api(original, parsing_time)?),
            None => debug!(
                id = ?id_string(raw, "id"),
                "retweet without its original tweet, skipping"
            ),
        }
    } else {
        docs.push(scraped_tweet(raw, parsing_time)?);
    }

    if optional_str(raw, "quote_url").is_some_and(|u| !u.is_empty()) {
        push_quoted(raw, parsing_time, &mut docs);
    }
    Ok(docs)
}

fn scraped_tweet(raw: &Value, parsing_time: &str) -> Result<Document> {
    let id = id_string(raw, "id").ok_or_else(|| anyhow!("missing tweet id"))?;
    let text = required_str(raw, "tweet")?;
    let username = required_str(raw, "username")?;
    let url = match optional_str(raw, "link") {
        Some(link) if !link.is_empty() => link.to_string(),
        _ => tweet_url(username, &id),
    };

    let mut doc = Document::new(Source::Twitter, url, text.trim());
    doc.author_screen_name = Some(username.to_string());
    doc.create_time = scraped_time(raw)?;
    doc.parsing_time = Some(parsing_time.to_string());
    doc.extra.insert("id".into(), Value::String(id));
    if let Some(user_id) = id_string(raw, "user_id") {
        doc.extra.insert("user_id".into(), Value::String(user_id));
    }
    if let Some(conversation_id) = id_string(raw, "conversation_id") {
        doc.extra
            .insert("conversation_id".into(), Value::String(conversation_id));
    }
    pass_through(&mut doc, raw, "name", "author_name");
    pass_through(&mut doc, raw, "language", "lang");
    for key in [
        "urls",
        "photos",
        "hashtags",
        "quote_url",
        "video",
        "thumbnail",
        "user_rt_id",
    ] {
        pass_through(&mut doc, raw, key, key);
    }
    if let Some(Value::Array(replies)) = raw.get("reply_to") {
        let names: Vec<Value> = replies
            .iter()
            .filter_map(|r| r.get("screen_name").cloned())
            .collect();
        doc.extra.insert("reply_to".into(), Value::Array(names));
    }
    Ok(doc)
}

/// Creation time of a scraped tweet.
///
/// Prefers the `created_at` epoch milliseconds; otherwise combines `date`,
/// `time` and `timezone` (`+0200`), assuming UTC when no zone is given.
fn scraped_time(raw: &Value) -> Result<Option<String>> {
    if let Some(ms) = raw.get("created_at").and_then(Value::as_i64) {
        return epoch_millis_to_iso(ms).map(Some);
    }
    let date = match optional_str(raw, "date") {
        Some(d) if !d.trim().is_empty() => d.trim(),
        _ => return Ok(None),
    };
    let local = match optional_str(raw, "time") {
        Some(t) if !t.trim().is_empty() && !date.contains(' ') => format!("{} {}", date, t.trim()),
        _ => date.to_string(),
    };
    let naive = NaiveDateTime::parse_from_str(&local, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| {
            NaiveDate::parse_from_str(&local, "%Y-%m-%d")
                .map(|d| d.and_time(NaiveTime::default()))
        })
        .with_context(|| format!("invalid tweet date: {}", local))?;
    let zone = optional_str(raw, "timezone")
        .map(str::trim)
        .filter(|z| !z.is_empty())
        .unwrap_or("+0000");
    let stamped = format!("{} {}", naive.format("%Y-%m-%d %H:%M:%S"), zone);
    let dt = DateTime::parse_from_str(&stamped, "%Y-%m-%d %H:%M:%S %z")
        .with_context(|| format!("invalid tweet timezone: {}", zone))?;
    Ok(Some(dt.to_rfc3339_opts(SecondsFormat::AutoSi, false)))
}
