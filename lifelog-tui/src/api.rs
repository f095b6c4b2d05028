//! HTTP client for Datasette-style query APIs.
//!
//! Every request goes through a [`FetchGate`] so one wide lane cannot starve
//! the others. Paginated endpoints are walked via their `Link: rel="next"`
//! header and the concatenated rows are cached for the `_ttl` they were
//! requested with.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use moka::future::Cache;
use moka::Expiry;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use url::Url;

use crate::catalog::LoadOutcome;
use crate::range::{Range, Timestamp};
use crate::view::ViewRequest;

/// Default number of simultaneous in-flight requests
pub const DEFAULT_CONCURRENCY: usize = 4;
/// Default cap on pages followed for one query
pub const DEFAULT_MAX_PAGES: usize = 1000;
/// Cache hint for ranges that can no longer change
pub const PAST_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Cache hint for ranges that may still be receiving data
pub const LIVE_TTL: Duration = Duration::from_secs(60);

/// Why a single query failed. The display text is shown to the user in place
/// of the missing records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("expected a JSON array, got {0}")]
    NotArray(&'static str),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("gave up after {0} pages")]
    TooManyPages(usize),
    #[error("pagination loops back to {0}")]
    PaginationCycle(String),
    #[error("request gate closed")]
    GateClosed,
}

/// One response body plus its raw `Link` header
#[derive(Debug, Clone)]
pub struct Page {
    pub body: Value,
    pub link: Option<String>,
}

/// Issues a single GET. Implemented over reqwest; tests substitute fakes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<Page, FetchError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Page, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let link = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(Page { body, link })
    }
}

/// Bounded-concurrency gate shared by every loader
#[derive(Debug, Clone)]
pub struct FetchGate {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl Default for FetchGate {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl FetchGate {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Permits not currently held
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `request` once a permit is free. Excess callers queue in FIFO order.
    pub async fn run<F, T>(&self, request: F) -> Result<T, FetchError>
    where
        F: Future<Output = Result<T, FetchError>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::GateClosed)?;
        request.await
    }
}

/// Parse an RFC 8288 `Link` header into `rel -> url`.
pub fn parse_link_header(header: &str) -> HashMap<String, String> {
    let mut rels = HashMap::new();
    let mut rest = header;

    while let Some(open) = rest.find('<') {
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('>') else {
            break;
        };
        let href = after_open[..close].trim();
        let tail = &after_open[close + 1..];
        let params_end = tail.find('<').unwrap_or(tail.len());

        for param in tail[..params_end].split(';') {
            let param = param.trim().trim_end_matches(',').trim();
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            if !key.trim().eq_ignore_ascii_case("rel") {
                continue;
            }
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            for rel in value.split_whitespace() {
                rels.insert(rel.to_ascii_lowercase(), href.to_string());
            }
        }

        rest = &tail[params_end..];
    }

    rels
}

/// Cache lifetime for a query over `range`: long once the range ended more
/// than a week before `now`, short otherwise.
pub fn ttl_for(range: Range, now: Timestamp) -> Duration {
    if range.end() < now - ChronoDuration::weeks(1) {
        PAST_TTL
    } else {
        LIVE_TTL
    }
}

/// Append the `_ttl` cache hint to `url`
pub fn with_ttl(mut url: Url, ttl: Duration) -> Url {
    url.query_pairs_mut()
        .append_pair("_ttl", &ttl.as_secs().to_string());
    url
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone)]
struct CachedBody {
    body: Arc<Value>,
    ttl: Duration,
}

struct TtlExpiry;

impl Expiry<String, CachedBody> for TtlExpiry {
    fn expire_after_create(&self, _key: &String, value: &CachedBody, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory response cache keyed by request URL, with per-entry TTL
#[derive(Clone)]
pub struct ResponseCache {
    inner: Cache<String, CachedBody>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(512)
    }
}

impl ResponseCache {
    pub fn new(max_entries: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(TtlExpiry)
            .build();
        Self { inner }
    }

    pub async fn get(&self, key: &str) -> Option<Arc<Value>> {
        self.inner.get(key).await.map(|cached| cached.body)
    }

    pub async fn insert(&self, key: String, body: Value, ttl: Duration) {
        let cached = CachedBody {
            body: Arc::new(body),
            ttl,
        };
        self.inner.insert(key, cached).await;
    }
}

/// Gated, cached, pagination-following client
#[derive(Clone)]
pub struct PagedClient {
    transport: Arc<dyn Transport>,
    gate: FetchGate,
    cache: ResponseCache,
    max_pages: usize,
}

impl PagedClient {
    pub fn new(transport: Arc<dyn Transport>, gate: FetchGate) -> Self {
        Self {
            transport,
            gate,
            cache: ResponseCache::default(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn gate(&self) -> &FetchGate {
        &self.gate
    }

    /// Fetch `url` and every page after it, concatenating the JSON arrays.
    ///
    /// A failure on any page fails the whole walk; rows from earlier pages
    /// are discarded.
    pub async fn fetch_all_pages(&self, url: Url, ttl: Duration) -> Result<Vec<Value>, FetchError> {
        let url = with_ttl(url, ttl);
        let key = url.to_string();
        if let Some(cached) = self.cache.get(&key).await {
            if let Value::Array(rows) = cached.as_ref() {
                tracing::debug!(url = %key, rows = rows.len(), "cache hit");
                return Ok(rows.clone());
            }
        }

        let mut rows = Vec::new();
        let mut seen = HashSet::new();
        let mut pages = 0usize;
        let mut next = Some(url);

        while let Some(current) = next.take() {
            if !seen.insert(current.to_string()) {
                return Err(FetchError::PaginationCycle(current.to_string()));
            }
            if pages >= self.max_pages {
                return Err(FetchError::TooManyPages(self.max_pages));
            }
            pages += 1;

            let page = self.gate.run(self.transport.get(current.as_str())).await?;
            match page.body {
                Value::Array(items) => rows.extend(items),
                other => return Err(FetchError::NotArray(json_kind(&other))),
            }

            next = match page.link.as_deref().map(parse_link_header) {
                Some(mut rels) => match rels.remove("next") {
                    Some(href) => Some(
                        current
                            .join(&href)
                            .map_err(|e| FetchError::InvalidUrl(format!("{href}: {e}")))?,
                    ),
                    None => None,
                },
                None => None,
            };
        }

        tracing::debug!(url = %key, pages, rows = rows.len(), "fetched");
        self.cache.insert(key, Value::Array(rows.clone()), ttl).await;
        Ok(rows)
    }

    /// Fetch a single JSON document through the gate and cache
    pub async fn fetch_json(&self, url: Url, ttl: Duration) -> Result<Value, FetchError> {
        let key = url.to_string();
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached.as_ref().clone());
        }
        let page = self.gate.run(self.transport.get(url.as_str())).await?;
        self.cache.insert(key, page.body.clone(), ttl).await;
        Ok(page.body)
    }
}

/// Messages sent from the API worker to the main TUI thread
#[derive(Debug, Clone)]
pub enum ApiMessage {
    /// A lane finished loading for the view it was requested with
    Loaded(LoadOutcome),
    /// A lane could not be loaded at all
    Failed { request: ViewRequest, message: String },
}

/// Commands sent from the TUI to the API worker
#[derive(Debug, Clone)]
pub enum ApiCommand {
    /// (Re)load one lane; supersedes any in-flight load for the same group
    Load(ViewRequest),
    /// Shutdown the API worker
    Shutdown,
}
