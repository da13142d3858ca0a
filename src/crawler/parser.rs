//! API response parsing
//!
//! This module turns raw API responses into the typed values the crawler needs:
//! - Rate-limit telemetry from the `X-RateLimit-*` headers
//! - Pagination from the `Link` header
//! - Search pages, repository metadata, trees, and file contents from JSON bodies
//!
//! Malformed bodies never fail the crawl; they decode to `None` and the caller treats
//! them as "no data".

use crate::classify::TreeEntry;
use crate::state::RepoId;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Quota telemetry carried by one response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateStatus {
    /// Requests left in the current quota window
    pub remaining: u64,

    /// When the quota window renews
    pub reset_at: DateTime<Utc>,
}

/// Reads rate-limit telemetry; `None` unless both headers are present and numeric
pub fn parse_rate_status(headers: &HeaderMap) -> Option<RateStatus> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };

    let remaining = header(REMAINING_HEADER)?;
    let reset = header(RESET_HEADER)?;
    let reset_at = Utc.timestamp_opt(reset, 0).single()?;

    Some(RateStatus {
        remaining: remaining.max(0) as u64,
        reset_at,
    })
}

/// Extracts the `rel="next"` target from a `Link` header value
///
/// ```
/// use repo_sieve::crawler::parse_link_header;
///
/// let header = r#"<https://api.example.com/search?page=2>; rel="next", <https://api.example.com/search?page=10>; rel="last""#;
/// assert_eq!(
///     parse_link_header(header).as_deref(),
///     Some("https://api.example.com/search?page=2")
/// );
/// ```
pub fn parse_link_header(value: &str) -> Option<String> {
    value.split(',').find_map(|link| {
        let (target, params) = link.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| p.trim().eq_ignore_ascii_case(r#"rel="next""#));
        if !is_next {
            return None;
        }
        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        Some(target.to_string())
    })
}

/// Reads the next-page link of a response, if any
pub fn next_page_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get(reqwest::header::LINK)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_link_header)
}

/// Returns true when a rejection body reports quota exhaustion
pub fn is_rate_limit_message(body: &str) -> bool {
    body.to_lowercase().contains("rate limit")
}

/// Decodes a JSON body into `T`, treating any mismatch as missing data
pub fn parse_body<T: DeserializeOwned>(body: &Value) -> Option<T> {
    match T::deserialize(body) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!("Unexpected response shape: {}", e);
            None
        }
    }
}

/// One repository returned by the search endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: RepoId,

    /// Public web address, when the API supplied one
    pub html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    name: String,
    owner: SearchOwner,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawSearchPage {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    items: Vec<Value>,
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
    pub total_count: u64,

    /// Number of items the API returned, including ones that could not be decoded
    pub item_count: usize,

    pub candidates: Vec<Candidate>,
}

/// Decodes a search response body
///
/// Individual items without an owner login or name are skipped rather than failing
/// the whole page.
pub fn parse_search_page(body: &Value) -> Option<SearchPage> {
    let raw: RawSearchPage = parse_body(body)?;
    let item_count = raw.items.len();
    let candidates = raw
        .items
        .iter()
        .filter_map(|item| match SearchItem::deserialize(item) {
            Ok(item) => Some(Candidate {
                id: RepoId::new(item.owner.login, item.name),
                html_url: item.html_url,
            }),
            Err(e) => {
                tracing::warn!("Skipping malformed search item: {}", e);
                None
            }
        })
        .collect();

    Some(SearchPage {
        total_count: raw.total_count,
        item_count,
        candidates,
    })
}

/// Repository metadata; only the default branch is used
#[derive(Debug, Clone, Deserialize)]
pub struct RepoInfo {
    #[serde(default)]
    pub default_branch: Option<String>,
}

/// Recursive tree listing
#[derive(Debug, Clone, Deserialize)]
pub struct TreeListing {
    #[serde(default)]
    pub tree: Vec<TreeEntry>,

    /// Set when the API cut the listing short
    #[serde(default)]
    pub truncated: bool,
}

/// Metadata of a single file from the contents endpoint
///
/// Directories come back as a JSON array and therefore never decode into this type.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentFile {
    #[serde(default)]
    pub content: Option<String>,
}
