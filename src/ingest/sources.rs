// src/ingest/sources.rs
//! Category → feed URL configuration.
//!
//! Accepted shapes (TOML or JSON):
//!
//! ```toml
//! [feeds]
//! gastronomie = ["https://a.example/rss", "https://b.example/feed"]
//! artisanat = ["https://c.example/atom.xml"]
//! ```
//!
//! or the same mapping at the top level. Category and URL order is kept.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Url;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_SOURCES_PATH: &str = "SOURCES_PATH";
pub const DEFAULT_SOURCES_TOML: &str = "config/sources.toml";
pub const DEFAULT_SOURCES_JSON: &str = "config/sources.json";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSources {
    categories: Vec<(String, Vec<String>)>,
}

impl FeedSources {
    pub fn from_pairs<I, C, U, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (C, U)>,
        C: Into<String>,
        U: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            categories: pairs
                .into_iter()
                .map(|(c, urls)| (c.into(), urls.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    /// `(category, url)` pairs in configured order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.categories
            .iter()
            .flat_map(|(c, urls)| urls.iter().map(move |u| (c.as_str(), u.as_str())))
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.categories.iter().map(|(c, u)| (c.as_str(), u.as_slice()))
    }

    pub fn feed_count(&self) -> usize {
        self.categories.iter().map(|(_, u)| u.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.feed_count() == 0
    }
}

/// Load sources from an explicit path. `.toml` and `.json` are parsed as
/// such; anything else is tried as JSON, then TOML.
pub fn load_sources_from(path: &Path) -> Result<FeedSources> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feed sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
        .with_context(|| format!("parsing feed sources in {}", path.display()))
}

/// Load sources using env var + fallbacks:
/// 1) $SOURCES_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
pub fn load_sources_default() -> Result<FeedSources> {
    if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            bail!(
                "{ENV_SOURCES_PATH} points to non-existent path {}",
                pb.display()
            );
        }
        return load_sources_from(&pb);
    }
    for candidate in [DEFAULT_SOURCES_TOML, DEFAULT_SOURCES_JSON] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return load_sources_from(&pb);
        }
    }
    Err(anyhow!(
        "no feed sources configured (set {ENV_SOURCES_PATH} or create {DEFAULT_SOURCES_TOML})"
    ))
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<FeedSources> {
    let doc: Value = match hint_ext {
        "toml" => toml::from_str(s).context("invalid TOML")?,
        "json" => serde_json::from_str(s).context("invalid JSON")?,
        _ => match serde_json::from_str(s) {
            Ok(v) => v,
            Err(_) => toml::from_str(s).context("neither JSON nor TOML")?,
        },
    };
    from_document(&doc)
}

fn from_document(doc: &Value) -> Result<FeedSources> {
    let root = doc
        .as_object()
        .ok_or_else(|| anyhow!("feed sources must be a table of categories"))?;
    let mapping: &Map<String, Value> = match root.get("feeds") {
        Some(Value::Object(m)) => m,
        Some(_) => bail!("`feeds` must map category names to URL lists"),
        None => root,
    };

    let mut categories = Vec::with_capacity(mapping.len());
    for (category, urls) in mapping {
        let category = category.trim();
        if category.is_empty() {
            bail!("empty category name");
        }
        let list = urls
            .as_array()
            .ok_or_else(|| anyhow!("category {category:?}: expected an array of feed URLs"))?;

        let mut clean: Vec<String> = Vec::with_capacity(list.len());
        for u in list {
            let Some(raw) = u.as_str() else {
                bail!("category {category:?}: feed URLs must be strings");
            };
            let raw = raw.trim();
            if raw.is_empty() || clean.iter().any(|c| c == raw) {
                continue;
            }
            if !is_http_url(raw) {
                tracing::warn!(category, url = raw, "skipping invalid feed URL");
                continue;
            }
            clean.push(raw.to_string());
        }
        categories.push((category.to_string(), clean));
    }

    let sources = FeedSources { categories };
    if sources.is_empty() {
        bail!("no usable feed URLs configured");
    }
    Ok(sources)
}

fn is_http_url(s: &str) -> bool {
    Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_keeps_category_and_url_order() {
        let toml = r#"
[feeds]
gastronomie = [" https://z.example/rss ", "", "https://a.example/rss", "https://z.example/rss"]
artisanat = ["https://m.example/atom"]
design = []
"#;
        let s = parse_sources(toml, "toml").unwrap();
        let pairs: Vec<_> = s.iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("gastronomie", "https://z.example/rss"),
                ("gastronomie", "https://a.example/rss"),
                ("artisanat", "https://m.example/atom"),
            ]
        );
        assert_eq!(s.categories().count(), 3);
        assert_eq!(s.feed_count(), 3);
    }

    #[test]
    fn json_top_level_mapping_is_accepted() {
        let json = r#"{"zen": ["https://b.example/rss"], "art": ["https://a.example/rss"]}"#;
        let s = parse_sources(json, "json").unwrap();
        let cats: Vec<_> = s.categories().map(|(c, _)| c).collect();
        assert_eq!(cats, vec!["zen", "art"]);
    }

    #[test]
    fn unknown_extension_sniffs_format() {
        let toml = "[feeds]\nfood = [\"https://a.example/rss\"]\n";
        assert_eq!(parse_sources(toml, "").unwrap().feed_count(), 1);
        let json = r#"{"feeds": {"food": ["https://a.example/rss"]}}"#;
        assert_eq!(parse_sources(json, "yml").unwrap().feed_count(), 1);
    }

    #[test]
    fn invalid_urls_are_skipped() {
        let json = r#"{"food": ["ftp://a.example/rss", "not a url", "https://ok.example/rss"]}"#;
        let s = parse_sources(json, "json").unwrap();
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![("food", "https://ok.example/rss")]);
    }

    #[test]
    fn malformed_shapes_are_errors() {
        assert!(parse_sources(r#"{"feeds": ["https://a.example/rss"]}"#, "json").is_err());
        assert!(parse_sources(r#"{"food": "https://a.example/rss"}"#, "json").is_err());
        assert!(parse_sources(r#"{"food": [42]}"#, "json").is_err());
        assert!(parse_sources(r#"{"food": []}"#, "json").is_err());
        assert!(parse_sources("[feeds\nbroken", "toml").is_err());
    }
}
