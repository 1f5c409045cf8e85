use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed, Person};
use feed_rs::parser;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{redirect, Client};
use thiserror::Error;
use tracing::debug;

use crate::classify::{classify_category, classify_region};
use crate::config::SourceConfig;
use crate::dates;
use crate::sanitize::{clean_summary, extract_image};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const FEED_ACCEPT: &str = "application/rss+xml, application/atom+xml, application/rdf+xml, \
     application/xml;q=0.9, text/xml;q=0.9, */*;q=0.8";

const MAX_REDIRECTS: usize = 10;

/// Raw XML elements that may carry an entry's publication time.
const DATE_TAGS: &[&str] = &["pubDate", "dc:date", "published", "updated"];

/// Elements that identify an entry, used to key raw dates.
const KEY_TAGS: &[&str] = &["link", "guid", "id"];

/// Why a single source produced no feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("HTTP error: {0}")]
    Http(u16),
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Short error class for logs and statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::Http(_) => "http",
            FetchError::Other(_) => "other",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Http(status.as_u16())
        } else {
            FetchError::Other(e.to_string())
        }
    }
}

/// A successfully parsed feed plus the raw date strings feed-rs could not use.
#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub feed: Feed,
    /// Raw date text keyed by entry link / guid / id
    pub raw_dates: HashMap<String, String>,
}

/// One feed entry after cleanup and classification, ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedArticle {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub source_name: Option<String>,
    pub category_slug: Option<String>,
    pub region_slug: Option<String>,
}

/// Fetches and parses the feed of a single source.
///
/// Implementations report every failure as a [`FetchError`]; nothing a
/// remote host does may escape as a panic.
#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn fetch(&self, source: &SourceConfig) -> Result<FetchedFeed, FetchError>;
}

pub struct HttpFeedClient {
    client: Client,
}

impl HttpFeedClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(FEED_ACCEPT));

        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch(&self, source: &SourceConfig) -> Result<FetchedFeed, FetchError> {
        debug!("Fetching feed: {} ({})", source.name, source.feed_url);

        let response = self.client.get(&source.feed_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        parse_feed(&bytes)
    }
}

/// Parse feed bytes, keeping raw entry dates alongside the parsed model.
pub fn parse_feed(bytes: &[u8]) -> Result<FetchedFeed, FetchError> {
    let feed = parser::parse(bytes)
        .map_err(|e| FetchError::Other(format!("failed to parse feed: {}", e)))?;
    let raw_dates = extract_dates_from_xml(bytes);
    Ok(FetchedFeed { feed, raw_dates })
}

/// Turn a parsed feed into normalized articles.
///
/// Entries without a title or link are skipped; missing dates, images and
/// classifications just leave the field unset. At most `limit` articles are
/// returned.
pub fn parse_entries(
    fetched: &FetchedFeed,
    source_name: &str,
    limit: usize,
) -> Vec<NormalizedArticle> {
    let mut articles = Vec::new();

    for entry in &fetched.feed.entries {
        if articles.len() >= limit {
            break;
        }

        let title = entry
            .title
            .as_ref()
            .map(|t| t.content.trim())
            .unwrap_or_default();
        if title.is_empty() {
            debug!("Skipping entry without title from '{}'", source_name);
            continue;
        }

        let url = match entry.links.first().map(|l| l.href.trim()) {
            Some(href) if !href.is_empty() => href,
            _ => {
                debug!("Skipping entry with no link: {}", title);
                continue;
            }
        };

        let summary = clean_summary(raw_summary(entry).unwrap_or_default());
        let raw_date = fetched
            .raw_dates
            .get(url)
            .or_else(|| fetched.raw_dates.get(&entry.id))
            .map(String::as_str);
        let published_at = dates::normalize(entry.published.or(entry.updated), raw_date);

        let author = entry.authors.iter().find_map(display_name);

        articles.push(NormalizedArticle {
            title: title.to_string(),
            url: url.to_string(),
            category_slug: classify_category(title, &summary).map(str::to_string),
            region_slug: Some(classify_region(title, &summary).to_string()),
            summary,
            author,
            published_at,
            image_url: extract_image(entry),
            source_name: Some(source_name.to_string()),
        });
    }

    articles
}

/// Human-readable name for a feed author.
///
/// feed-rs maps RSS `<author>` to a person named "author" with the element
/// text in `email`; Atom `<name>` and `dc:creator` arrive as the name itself.
fn display_name(person: &Person) -> Option<String> {
    let name = person.name.trim();
    let email = person.email.as_deref().map(str::trim).unwrap_or_default();
    let text = if (name.is_empty() || name.eq_ignore_ascii_case("author")) && !email.is_empty() {
        email
    } else {
        name
    };
    (!text.is_empty()).then(|| text.to_string())
}

fn raw_summary(entry: &Entry) -> Option<&str> {
    entry
        .summary
        .as_ref()
        .map(|s| s.content.as_str())
        .filter(|s| !s.trim().is_empty())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.as_deref()))
}

/// Extract raw date text from `<item>`/`<entry>` blocks, keyed by each
/// identifying element the block carries (feed-rs drops dates it cannot parse).
pub fn extract_dates_from_xml(xml_bytes: &[u8]) -> HashMap<String, String> {
    let mut dates = HashMap::new();
    let xml = match std::str::from_utf8(xml_bytes) {
        Ok(s) => s,
        Err(_) => return dates,
    };

    for block_tag in ["item", "entry"] {
        let mut cursor = 0;
        while let Some((block, next)) = next_element(xml, block_tag, cursor) {
            cursor = next;

            let date = DATE_TAGS
                .iter()
                .find_map(|tag| extract_xml_element(block, tag).filter(|d| !d.is_empty()));
            let Some(date) = date else {
                continue;
            };

            for key_tag in KEY_TAGS {
                if let Some(key) = extract_xml_element(block, key_tag).filter(|k| !k.is_empty()) {
                    dates.insert(key, date.clone());
                }
            }
        }
    }

    dates
}

/// Text of the first `<tag>` (attributes allowed) in `xml`, with CDATA
/// unwrapped and entities decoded. Self-closing tags are skipped.
pub fn extract_xml_element(xml: &str, tag: &str) -> Option<String> {
    let (body, _) = next_element(xml, tag, 0)?;
    let body = body.trim();
    let body = body
        .strip_prefix("<![CDATA[")
        .and_then(|b| b.strip_suffix("]]>"))
        .unwrap_or(body);
    Some(html_escape::decode_html_entities(body.trim()).into_owned())
}

/// Locate the first `<tag ...>body</tag>` starting at byte offset `from`.
/// Returns the body and the offset just past the closing tag.
fn next_element<'a>(xml: &'a str, tag: &str, from: usize) -> Option<(&'a str, usize)> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut cursor = from;

    loop {
        let start = cursor + xml.get(cursor..)?.find(&open)? + open.len();
        let rest = &xml[start..];
        let boundary = rest.chars().next()?;
        if boundary == '>' || boundary.is_whitespace() {
            let gt = rest.find('>')?;
            if !rest[..gt].ends_with('/') {
                let body_start = start + gt + 1;
                let body_end = body_start + xml[body_start..].find(&close)?;
                return Some((&xml[body_start..body_end], body_end + close.len()));
            }
        }
        cursor = start;
    }
}
