// src/ingest/feed.rs
//! Feed fetching and syndication parsing.
//!
//! Covers the three formats the source catalog actually serves: RSS 2.0,
//! RSS 1.0 (RDF) and Atom. The root element decides the parse path; anything
//! else is a `FetchError::UnknownFormat`.

use async_trait::async_trait;
use metrics::histogram;
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::normalize_text;

/// One parsed feed entry. `title` is never empty (titleless entries are
/// dropped at parse); `link` and `summary` may be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub title: String,
    pub link: String,
    pub summary: String,
}

/// Per-source fetch/parse failure. Non-fatal: the scan records it in the
/// source's outcome and moves on.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),

    #[error("feed parse failed: {0}")]
    Parse(String),

    #[error("unrecognized feed format (root element `{0}`)")]
    UnknownFormat(String),
}

/// Seam between the orchestrator and the network. Tests swap in static
/// fetchers; production uses [`HttpFeedFetcher`].
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// One attempt, no retries. A hung server is bounded by the client
    /// timeout.
    async fn fetch(&self, url: &str) -> Result<Vec<Entry>, FetchError>;
}

pub struct HttpFeedFetcher {
    http: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .user_agent("defense-intel-monitor/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self { http }
    }
}

impl Default for HttpFeedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<Entry>, FetchError> {
        let t0 = std::time::Instant::now();
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status()));
        }
        let body = resp.text().await?;
        let entries = parse_feed(&body)?;
        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("scan_fetch_ms").record(ms);
        Ok(entries)
    }
}

// --- RSS 2.0 ---

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
}

// --- RSS 1.0 (RDF): items are children of the root, not of channel ---

#[derive(Debug, Deserialize)]
struct Rdf {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

// --- Atom ---

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<AtomText>,
    content: Option<AtomText>,
}

/// Atom text constructs carry a `type` attribute, so a plain `String` field
/// won't do; the text lives in `$text`.
#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

/// Parse a syndication document into entries, dispatching on the root
/// element: `rss` / `rdf:RDF` / `feed`.
pub fn parse_feed(xml: &str) -> Result<Vec<Entry>, FetchError> {
    let clean = scrub_html_entities_for_xml(xml);
    let root = root_element(&clean)
        .ok_or_else(|| FetchError::Parse("document has no root element".to_string()))?;
    match root.as_str() {
        "rss" => {
            let doc: Rss = from_str(&clean).map_err(|e| FetchError::Parse(e.to_string()))?;
            Ok(collect_items(doc.channel.items))
        }
        "rdf:RDF" | "RDF" => {
            let doc: Rdf = from_str(&clean).map_err(|e| FetchError::Parse(e.to_string()))?;
            Ok(collect_items(doc.items))
        }
        "feed" => {
            let doc: AtomFeed = from_str(&clean).map_err(|e| FetchError::Parse(e.to_string()))?;
            Ok(collect_atom_entries(doc.entries))
        }
        other => Err(FetchError::UnknownFormat(other.to_string())),
    }
}

/// Name of the first start tag, or `None` for empty/broken documents.
fn root_element(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                return Some(String::from_utf8_lossy(e.name().as_ref()).into_owned())
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

fn collect_items(items: Vec<RssItem>) -> Vec<Entry> {
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        push_entry(
            &mut out,
            it.title.as_deref(),
            it.link.as_deref(),
            it.description.as_deref(),
        );
    }
    out
}

fn collect_atom_entries(entries: Vec<AtomEntry>) -> Vec<Entry> {
    let mut out = Vec::with_capacity(entries.len());
    for en in entries {
        let link = pick_atom_link(&en.links);
        // `summary` is optional in Atom; fall back to `content`.
        let summary = en
            .summary
            .and_then(|t| t.value)
            .or_else(|| en.content.and_then(|t| t.value));
        push_entry(
            &mut out,
            en.title.and_then(|t| t.value).as_deref(),
            Some(link.as_str()),
            summary.as_deref(),
        );
    }
    out
}

/// Prefer `rel="alternate"` (or no rel at all), then any link with an href.
fn pick_atom_link(links: &[AtomLink]) -> String {
    links
        .iter()
        .find(|l| l.href.is_some() && matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.iter().find(|l| l.href.is_some()))
        .and_then(|l| l.href.clone())
        .unwrap_or_default()
}

fn push_entry(out: &mut Vec<Entry>, title: Option<&str>, link: Option<&str>, summary: Option<&str>) {
    let title = normalize_text(title.unwrap_or_default());
    if title.is_empty() {
        // The title is the dedup key; nothing to key on here.
        tracing::debug!("dropping feed entry without a title");
        return;
    }
    let summary = normalize_text(summary.unwrap_or_default());
    let link = link.unwrap_or_default().trim().to_string();
    out.push(Entry {
        title,
        link,
        summary,
    });
}

/// Feeds in the wild embed HTML entities the XML parser chokes on.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
