// src/ingest/parse.rs
//! Feed document → [`RawEntry`] list, via `feed-rs` (RSS 0.9x/1.0/2.0, Atom,
//! JSON Feed). No I/O happens here.

use feed_rs::model::{Entry, Link};
use feed_rs::model::Feed;
use feed_rs::parser::{self, ParseFeedError};

use crate::ingest::types::RawEntry;

#[derive(Debug, thiserror::Error)]
#[error("malformed feed: {0}")]
pub struct ParseError(#[from] ParseFeedError);

/// Parse a fetched feed body. Empty (or whitespace-only) input is not an
/// error and yields no entries.
pub fn parse_entries(bytes: &[u8]) -> Result<Vec<RawEntry>, ParseError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let feed = match parse_feed(bytes) {
        Ok(feed) => feed,
        Err(first) => {
            // HTML named entities are invalid XML but common in hand-rolled feeds.
            let Some(scrubbed) = std::str::from_utf8(bytes)
                .ok()
                .filter(|s| s.contains('&'))
                .map(scrub_html_entities_for_xml)
            else {
                return Err(first.into());
            };
            parse_feed(scrubbed.as_bytes()).map_err(|_| ParseError(first))?
        }
    };

    Ok(feed.entries.into_iter().map(to_raw_entry).collect())
}

/// feed-rs invents an id for entries that carry none (a link hash, or a
/// random UUID without a link). An empty id keeps the entry's own link and
/// title as its identity.
fn parse_feed(bytes: &[u8]) -> Result<Feed, ParseFeedError> {
    parser::Builder::new()
        .id_generator(|_, _, _| String::new())
        .build()
        .parse(bytes)
}

fn to_raw_entry(entry: Entry) -> RawEntry {
    let id = Some(entry.id).filter(|s| !s.trim().is_empty());
    let link = pick_link(&entry.links);
    let title = entry.title.map(|t| t.content);
    let summary = entry
        .summary
        .map(|s| s.content)
        .or_else(|| entry.content.and_then(|c| c.body));

    RawEntry {
        id,
        link,
        title,
        summary,
        published: entry.published,
        updated: entry.updated,
    }
}

/// First `alternate` (or rel-less) link, else the first link at all.
fn pick_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", "&#160;")
        .replace("&ndash;", "&#8211;")
        .replace("&mdash;", "&#8212;")
        .replace("&ldquo;", "&#8220;")
        .replace("&rdquo;", "&#8221;")
        .replace("&lsquo;", "&#8216;")
        .replace("&rsquo;", "&#8217;")
        .replace("&hellip;", "&#8230;")
        .replace("&eacute;", "&#233;")
        .replace("&egrave;", "&#232;")
        .replace("&agrave;", "&#224;")
        .replace("&ccedil;", "&#231;")
}
