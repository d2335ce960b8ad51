//! Text downloads for data the layer tree fills in after startup.
//!
//! A [`Fetcher`] never blocks the caller: it runs the request elsewhere
//! and hands the outcome to a callback. The layer manager's callbacks
//! only send into a channel that it drains between ticks, so tree
//! mutations never happen in the middle of a traversal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Failed to read response: {0}")]
    Read(String),

    #[error("No response for {0}")]
    NotFound(String),

    #[error("Network fetch is not available on this target")]
    Unsupported,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum FetchState {
    #[default]
    NotStarted,
    Loading,
    Loaded,
    Failed(String),
}

impl FetchState {
    pub fn is_loading(&self) -> bool {
        matches!(self, FetchState::Loading)
    }

    /// Settled means a new request for the same resource is allowed.
    pub fn is_settled(&self) -> bool {
        matches!(self, FetchState::Loaded | FetchState::Failed(_))
    }
}

pub type FetchCallback = Box<dyn FnOnce(Result<String, FetchError>) + Send>;

pub trait Fetcher: Send + Sync {
    fn fetch_text(&self, url: &str, done: FetchCallback);
}

/// Blocking GET on a background thread.
#[cfg(not(target_arch = "wasm32"))]
pub struct ThreadFetcher {
    timeout: std::time::Duration,
}

#[cfg(not(target_arch = "wasm32"))]
impl ThreadFetcher {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout: std::time::Duration::from_secs(timeout_secs) }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn fetch_blocking(url: &str, timeout: std::time::Duration) -> Result<String, FetchError> {
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();
    let response = agent.get(url).call().map_err(|e| FetchError::Http(e.to_string()))?;
    response.into_string().map_err(|e| FetchError::Read(e.to_string()))
}

#[cfg(not(target_arch = "wasm32"))]
impl Fetcher for ThreadFetcher {
    fn fetch_text(&self, url: &str, done: FetchCallback) {
        let url = url.to_string();
        let timeout = self.timeout;
        std::thread::spawn(move || {
            log::debug!("Fetching {}", url);
            done(fetch_blocking(&url, timeout));
        });
    }
}

/// Fetcher for targets without a native transport. Every request fails.
pub struct NullFetcher;

impl Fetcher for NullFetcher {
    fn fetch_text(&self, _url: &str, done: FetchCallback) {
        done(Err(FetchError::Unsupported));
    }
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
pub fn encode_query_value(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}

/// Retries a failed request once through a proxy that takes the target
/// URL as its last query value. A second failure is reported as is.
pub struct ProxyFallbackFetcher<F> {
    inner: Arc<F>,
    proxy_prefix: String,
}

impl<F: Fetcher + 'static> ProxyFallbackFetcher<F> {
    pub fn new(inner: F, proxy_prefix: &str) -> Self {
        Self { inner: Arc::new(inner), proxy_prefix: proxy_prefix.to_string() }
    }

    pub fn proxied_url(&self, url: &str) -> String {
        format!("{}{}", self.proxy_prefix, encode_query_value(url))
    }
}

impl<F: Fetcher + 'static> Fetcher for ProxyFallbackFetcher<F> {
    fn fetch_text(&self, url: &str, done: FetchCallback) {
        if self.proxy_prefix.is_empty() || url.starts_with(&self.proxy_prefix) {
            self.inner.fetch_text(url, done);
            return;
        }
        let inner = Arc::clone(&self.inner);
        let proxied = self.proxied_url(url);
        let original = url.to_string();
        self.inner.fetch_text(
            url,
            Box::new(move |result| match result {
                Ok(text) => done(Ok(text)),
                Err(e) => {
                    log::warn!("Fetch of {} failed ({}), retrying through proxy", original, e);
                    inner.fetch_text(&proxied, done);
                }
            }),
        );
    }
}

/// Canned responses, answered synchronously. Unknown URLs fail with
/// [`FetchError::NotFound`].
#[derive(Default)]
pub struct MemoryFetcher {
    responses: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, url: &str, body: &str) -> Self {
        self.insert(url, body);
        self
    }

    pub fn insert(&self, url: &str, body: &str) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(url.to_string(), body.to_string());
        }
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch_text(&self, url: &str, done: FetchCallback) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        let body = self.responses.lock().ok().and_then(|r| r.get(url).cloned());
        done(body.ok_or_else(|| FetchError::NotFound(url.to_string())));
    }
}

impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    fn fetch_text(&self, url: &str, done: FetchCallback) {
        (**self).fetch_text(url, done);
    }
}
