//! Search result rendering.
//!
//! Turns a [`Document`] into the HTML fragment the web front end inserts
//! into its result list. What goes into the title and excerpts depends on
//! the source, so each source has its own [`SourceFormatter`]:
//!
//! | Source | Title | Short excerpt | Long excerpt |
//! |--------|-------|---------------|--------------|
//! | roam-research | `/<database> <title>` | none | page outline (markup kept) |
//! | twitter | `@<author_screen_name>` | tweet text | tweet text |
//! | slack | `#<channel>` | first message | whole thread, messages divided |
//!
//! The short excerpt is cut to a character budget. The long excerpt is only
//! rendered when it adds something to the short one.

use anyhow::{anyhow, Result};

use crate::models::{Document, Source, THREAD_SEPARATOR};

/// Visible divider between the messages of a Slack thread.
pub const MESSAGE_DIVIDER: &str = r#"<div class="message_sep">-----</div>"#;

/// Display pieces of one result, already HTML-safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedResult {
    pub source: Source,
    pub url: String,
    pub title: String,
    pub date: String,
    pub short: String,
    pub long: Option<String>,
}

impl RenderedResult {
    pub fn to_html(&self) -> String {
        let link_class = if self.url.is_empty() {
            "title link_missing"
        } else {
            "title"
        };
        let long = match &self.long {
            Some(long) => format!(
                "
            <a class='show_more'>[more]</a>
            <div class='content long'>
                {}
            </div>
            <a class='show_less'>[less]</a>
        ",
                long
            ),
            None => String::new(),
        };
        format!(
            r#"
        <div class='search_result'>
            <a href="{url}" target='_blank'
               class='{link_class}'>
                <img src="static/img/{source}.png" alt="{source}">
                {title}
            </a>
            <span class='time'>({date})</span>
            <div class='content short'>
                {short}
            </div>
            {long}
        </div>
    "#,
            url = html_escape(&self.url),
            link_class = link_class,
            source = self.source,
            title = self.title,
            date = self.date,
            short = self.short,
            long = long,
        )
    }
}

/// Per-source choice of title and excerpts. Returned strings are raw text
/// or markup; escaping is decided by [`escape_text`](Self::escape_text).
pub trait SourceFormatter: Send + Sync {
    fn title(&self, doc: &Document) -> Result<String>;

    fn short_excerpt<'a>(&self, doc: &'a Document) -> &'a str;

    /// Long excerpt as HTML.
    fn long_excerpt(&self, doc: &Document) -> String;

    /// Whether document text is plain text that must be escaped.
    fn escape_text(&self) -> bool {
        true
    }
}

struct RoamFormatter;
struct TwitterFormatter;
struct SlackFormatter;

fn missing(doc: &Document, field: &str) -> anyhow::Error {
    anyhow!(
        "{} document '{}' has no {}",
        doc.source,
        doc.url,
        field
    )
}

impl SourceFormatter for RoamFormatter {
    fn title(&self, doc: &Document) -> Result<String> {
        let database = doc.database.as_deref().ok_or_else(|| missing(doc, "database"))?;
        let title = doc.title.as_deref().ok_or_else(|| missing(doc, "title"))?;
        Ok(format!("/{} {}", html_escape(database), html_escape(title)))
    }

    fn short_excerpt<'a>(&self, _doc: &'a Document) -> &'a str {
        ""
    }

    fn long_excerpt(&self, doc: &Document) -> String {
        doc.text.clone()
    }

    fn escape_text(&self) -> bool {
        false
    }
}

impl SourceFormatter for TwitterFormatter {
    fn title(&self, doc: &Document) -> Result<String> {
        let handle = doc
            .author_screen_name
            .as_deref()
            .ok_or_else(|| missing(doc, "author_screen_name"))?;
        Ok(format!("@{}", html_escape(handle)))
    }

    fn short_excerpt<'a>(&self, doc: &'a Document) -> &'a str {
        &doc.text
    }

    fn long_excerpt(&self, doc: &Document) -> String {
        html_escape(&doc.text)
    }
}

impl SourceFormatter for SlackFormatter {
    fn title(&self, doc: &Document) -> Result<String> {
        let channel = doc.channel.as_deref().ok_or_else(|| missing(doc, "channel"))?;
        Ok(format!("#{}", html_escape(channel)))
    }

    fn short_excerpt<'a>(&self, doc: &'a Document) -> &'a str {
        doc.text
            .split_once(THREAD_SEPARATOR)
            .map_or(doc.text.as_str(), |(first, _)| first)
    }

    fn long_excerpt(&self, doc: &Document) -> String {
        doc.text
            .split(THREAD_SEPARATOR)
            .map(html_escape)
            .collect::<Vec<_>>()
            .join(MESSAGE_DIVIDER)
    }
}

pub fn formatter_for(source: Source) -> &'static dyn SourceFormatter {
    match source {
        Source::RoamResearch => &RoamFormatter,
        Source::Twitter => &TwitterFormatter,
        Source::Slack => &SlackFormatter,
    }
}

/// Cut `text` to at most `max_chars` characters, ending with `...` when cut.
pub fn truncate_excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

pub fn render_result(doc: &Document, excerpt_chars: usize) -> Result<RenderedResult> {
    let formatter = formatter_for(doc.source);
    let title = formatter.title(doc)?;

    let short_raw = formatter.short_excerpt(doc);
    let short_cut = truncate_excerpt(short_raw, excerpt_chars);
    let short = if formatter.escape_text() {
        html_escape(&short_cut)
    } else {
        short_cut.clone()
    };
    let long = (short_cut != doc.text).then(|| formatter.long_excerpt(doc));

    let date = doc.display_date().unwrap_or_default();

    Ok(RenderedResult {
        source: doc.source,
        url: doc.url.clone(),
        title,
        date,
        short,
        long,
    })
}

/// Escape HTML special characters for text and attribute values.
pub fn html_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            _ => result.push(c),
        }
    }
    result
}
