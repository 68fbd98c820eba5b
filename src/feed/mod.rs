// arXiv Atom feed client
// Wire parsing, identifier handling, and rate-limited page fetching for the
// upstream export API.


use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::{HubError, Result};

pub const DEFAULT_API_URL: &str = "http://export.arxiv.org/api/query";
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(3);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const ATOM_HOST: &str = "arxiv.org";

/// One parsed entry from the upstream feed.
///
/// `base_id` is `arxiv_id` with any trailing `vN` suffix stripped; it is the
/// stable key across resubmissions of the same paper.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub arxiv_id: String,
    pub base_id: String,
    pub version: u32,
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub primary_category: String,
    pub published_at: String,
    pub updated_at: String,
    /// Link kind ("abs", "pdf") to URL.
    pub links: BTreeMap<String, String>,
}

/// One raw result page plus its parsed entry count.
#[derive(Debug, Clone)]
pub struct FeedPage {
    pub raw_xml: String,
    pub entry_count: usize,
}

/// Source of raw feed pages, fronting [`FeedClient`] so batch pipelines can
/// be driven from scripted pages in tests.
pub trait FeedSource {
    fn fetch_page(&self, search_query: &str, start: usize, max_results: usize)
    -> Result<FeedPage>;
}

/// Minimum-interval limiter for outbound feed calls.
///
/// The upstream API throttles aggressively, so every call must pass through
/// `acquire` first. One limiter instance serializes all calls made through
/// the client that owns it.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    #[inline]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Block until the minimum interval since the previous call has elapsed,
    /// then record this call.
    #[inline]
    pub fn acquire(&self) {
        let mut last_call = self
            .last_call
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                thread::sleep(self.min_interval - elapsed);
            }
        }
        *last_call = Some(Instant::now());
    }
}

/// Blocking client for the upstream metadata feed.
pub struct FeedClient {
    agent: ureq::Agent,
    api_url: Url,
    limiter: RateLimiter,
}

impl FeedClient {
    #[inline]
    pub fn new() -> Result<Self> {
        Self::with_api_url(DEFAULT_API_URL)
    }

    #[inline]
    pub fn with_api_url(api_url: &str) -> Result<Self> {
        let api_url = Url::parse(api_url)
            .map_err(|e| HubError::Config(format!("invalid feed API URL '{api_url}': {e}")))?;
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build()
            .into();
        Ok(Self {
            agent,
            api_url,
            limiter: RateLimiter::new(MIN_REQUEST_INTERVAL),
        })
    }

    /// Fetch a single entry by its identifier.
    #[inline]
    pub fn get_by_id(&self, arxiv_id: &str) -> Result<FeedEntry> {
        let page = self.fetch_page(&format!("id:{arxiv_id}"), 0, 1)?;
        let mut entries = parse_feed(&page.raw_xml)?;
        if entries.is_empty() {
            return Err(HubError::NotFound(format!(
                "no entry found for id {arxiv_id}"
            )));
        }
        Ok(entries.swap_remove(0))
    }

    /// Issue one page request and return the parsed entries.
    ///
    /// Finite and not restartable: each call is exactly one HTTP round-trip.
    #[inline]
    pub fn query_page(
        &self,
        search_query: &str,
        start: usize,
        max_results: usize,
    ) -> Result<Vec<FeedEntry>> {
        let page = self.fetch_page(search_query, start, max_results)?;
        parse_feed(&page.raw_xml)
    }

    fn fetch_raw(&self, search_query: &str, start: usize, max_results: usize) -> Result<String> {
        let mut url = self.api_url.clone();
        url.query_pairs_mut()
            .append_pair("search_query", search_query)
            .append_pair("start", &start.to_string())
            .append_pair("max_results", &max_results.to_string())
            .append_pair("sortBy", "submittedDate")
            .append_pair("sortOrder", "descending");

        self.limiter.acquire();
        debug!("Fetching feed page: start={start} max_results={max_results}");

        let mut response = self
            .agent
            .get(url.as_str())
            .call()
            .map_err(|e| HubError::Transport(format!("feed request failed: {e}")))?;
        response
            .body_mut()
            .read_to_string()
            .map_err(|e| HubError::Transport(format!("failed to read feed response: {e}")))
    }
}

impl FeedSource for FeedClient {
    #[inline]
    fn fetch_page(
        &self,
        search_query: &str,
        start: usize,
        max_results: usize,
    ) -> Result<FeedPage> {
        let raw_xml = self.fetch_raw(search_query, start, max_results)?;
        let entry_count = count_entries(&raw_xml)?;
        Ok(FeedPage {
            raw_xml,
            entry_count,
        })
    }
}

// Atom wire structures. Namespace prefixes are ignored by the deserializer,
// which matches the upstream feed's default-namespace layout.

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AtomEntry {
    id: Option<String>,
    title: Option<String>,
    summary: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term")]
    term: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@rel")]
    rel: Option<String>,
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@title")]
    title: Option<String>,
}

/// Parse every entry in a raw feed page, skipping entries that fail to parse.
#[inline]
pub fn parse_feed(raw_xml: &str) -> Result<Vec<FeedEntry>> {
    let feed: AtomFeed = quick_xml::de::from_str(raw_xml)
        .map_err(|e| HubError::Malformed(format!("unparseable feed page: {e}")))?;
    let mut entries = Vec::with_capacity(feed.entries.len());
    for raw_entry in feed.entries {
        match parse_entry(raw_entry) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("Skipping malformed feed entry: {e}"),
        }
    }
    Ok(entries)
}

/// Number of `<entry>` elements in a raw feed page.
#[inline]
pub fn count_entries(raw_xml: &str) -> Result<usize> {
    let feed: AtomFeed = quick_xml::de::from_str(raw_xml)
        .map_err(|e| HubError::Malformed(format!("unparseable feed page: {e}")))?;
    Ok(feed.entries.len())
}

pub(crate) fn parse_entry(entry: AtomEntry) -> Result<FeedEntry> {
    let raw_id = entry
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| HubError::Malformed("entry missing id field".to_string()))?;
    // The feed reports ids as full URLs; the identifier is the last segment.
    let arxiv_id = raw_id.rsplit('/').next().unwrap_or(raw_id).to_string();
    let (base_id, version) = split_version(&arxiv_id);

    let categories: Vec<String> = entry
        .categories
        .into_iter()
        .filter_map(|category| category.term)
        .collect();
    let primary_category = categories.first().cloned().unwrap_or_default();

    let authors = entry
        .authors
        .into_iter()
        .filter_map(|author| author.name)
        .collect();

    Ok(FeedEntry {
        arxiv_id,
        base_id,
        version,
        title: collapse_whitespace(entry.title.as_deref().unwrap_or_default()),
        abstract_text: collapse_whitespace(entry.summary.as_deref().unwrap_or_default()),
        authors,
        categories,
        primary_category,
        published_at: entry.published.unwrap_or_default().trim().to_string(),
        updated_at: entry.updated.unwrap_or_default().trim().to_string(),
        links: extract_links(&entry.links),
    })
}

fn extract_links(links: &[AtomLink]) -> BTreeMap<String, String> {
    let mut extracted = BTreeMap::new();
    for link in links {
        let (Some(rel), Some(href)) = (link.rel.as_deref(), link.href.as_deref()) else {
            continue;
        };
        if rel == "alternate" || rel.ends_with("/abs") {
            extracted.insert("abs".to_string(), href.to_string());
        } else if rel.ends_with("/pdf") || link.title.as_deref() == Some("pdf") {
            extracted.insert("pdf".to_string(), href.to_string());
        }
    }
    extracted
}

/// Split a trailing `vN` version suffix off an identifier.
///
/// Upstream version numbers normally only increase, but nothing here relies
/// on that; the default for an unversioned identifier is 1.
#[inline]
pub fn split_version(arxiv_id: &str) -> (String, u32) {
    if let Some(position) = arxiv_id.rfind('v') {
        let (base, suffix) = arxiv_id.split_at(position);
        let digits = suffix.strip_prefix('v').unwrap_or(suffix);
        if !base.is_empty() && !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(version) = digits.parse() {
                return (base.to_string(), version);
            }
        }
    }
    (arxiv_id.to_string(), 1)
}

/// Collapse runs of whitespace (including newlines) to single spaces.
#[inline]
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract an identifier from an abstract-view or PDF-view URL.
///
/// Returns `None` for anything unrecognized; never fails. A version marker
/// present in the URL but missing from the path identifier is merged in, so
/// both `/abs/1234.5678v2` and `/pdf/1234.5678v2.pdf` yield `1234.5678v2`
/// exactly once.
#[inline]
pub fn parse_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    if host != ATOM_HOST && !host.ends_with(".arxiv.org") {
        return None;
    }
    let mut segments = url.path_segments()?;
    let kind = segments.next()?;
    if !kind.eq_ignore_ascii_case("abs") && !kind.eq_ignore_ascii_case("pdf") {
        return None;
    }
    let segment = segments.next()?;
    let identifier = segment.strip_suffix(".pdf").unwrap_or(segment);
    if identifier.is_empty() {
        return None;
    }

    let mut identifier = identifier.to_string();
    if let Some(marker) = find_version_marker(raw) {
        if !identifier.contains(&marker) {
            identifier.push_str(&marker);
        }
    }
    Some(identifier)
}

/// First `v<digits>` token anywhere in the URL, if any.
fn find_version_marker(raw: &str) -> Option<String> {
    let mut chars = raw.chars().peekable();
    while let Some(character) = chars.next() {
        if character != 'v' {
            continue;
        }
        let mut digits = String::new();
        while let Some(digit) = chars.peek().copied() {
            if !digit.is_ascii_digit() {
                break;
            }
            digits.push(digit);
            chars.next();
        }
        if !digits.is_empty() {
            return Some(format!("v{digits}"));
        }
    }
    None
}
