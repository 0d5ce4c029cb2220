// tests/support/mod.rs
// Shared helpers for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_harvester::ingest::fetch::{FeedFetcher, FetchError, Pause};

/// Minimal RSS 2.0 item; the link doubles as guid unless `without_guid`.
/// An empty link is left out.
pub struct Item<'a> {
    pub title: &'a str,
    pub link: &'a str,
    pub summary: &'a str,
    pub published: Option<DateTime<Utc>>,
    pub guid: bool,
}

impl<'a> Item<'a> {
    pub fn new(title: &'a str, link: &'a str, published: DateTime<Utc>) -> Self {
        Self {
            title,
            link,
            summary: "",
            published: Some(published),
            guid: true,
        }
    }

    pub fn undated(title: &'a str, link: &'a str) -> Self {
        Self {
            title,
            link,
            summary: "",
            published: None,
            guid: true,
        }
    }

    pub fn with_summary(mut self, summary: &'a str) -> Self {
        self.summary = summary;
        self
    }

    pub fn without_guid(mut self) -> Self {
        self.guid = false;
        self
    }
}

pub fn rss(items: &[Item<'_>]) -> String {
    let mut body = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Test feed</title><link>https://feed.example/</link><description>fixture</description>"#,
    );
    for it in items {
        body.push_str("<item>");
        body.push_str(&format!("<title>{}</title>", it.title));
        if !it.link.is_empty() {
            body.push_str(&format!("<link>{}</link>", it.link));
            if it.guid {
                body.push_str(&format!("<guid>{}</guid>", it.link));
            }
        }
        if !it.summary.is_empty() {
            body.push_str(&format!("<description><![CDATA[{}]]></description>", it.summary));
        }
        if let Some(ts) = it.published {
            body.push_str(&format!("<pubDate>{}</pubDate>", ts.to_rfc2822()));
        }
        body.push_str("</item>");
    }
    body.push_str("</channel></rss>");
    body
}

/// Serves canned bodies per URL; unknown URLs fail with 404.
#[derive(Default)]
pub struct ScriptedFetcher {
    bodies: HashMap<String, Result<String, u16>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(mut self, url: &str, body: impl Into<String>) -> Self {
        self.bodies.insert(url.to_string(), Ok(body.into()));
        self
    }

    pub fn fail(mut self, url: &str, status: u16) -> Self {
        self.bodies.insert(url.to_string(), Err(status));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.bodies.get(url) {
            Some(Ok(body)) => Ok(body.clone().into_bytes()),
            Some(Err(status)) => Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Records requested delays instead of sleeping.
#[derive(Default)]
pub struct RecordingPause {
    pub calls: Mutex<Vec<Duration>>,
}

impl RecordingPause {
    pub fn delays(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pause for RecordingPause {
    async fn pause(&self, delay: Duration) {
        self.calls.lock().unwrap().push(delay);
    }
}
