//! Network seam for the cache controller.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use url::Url;

/// Every fetch carries this timeout so a hung request cannot stall the
/// fallback chain.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// An intercepted resource request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: String,
    pub url: Url,
    /// True for full-page loads; they get the offline-page fallback.
    pub navigation: bool,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".into(),
            url,
            navigation: false,
        }
    }

    pub fn navigation(url: Url) -> Self {
        Self {
            method: "GET".into(),
            url,
            navigation: true,
        }
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// Cache key: the full URL including the query string.
    pub fn cache_key(&self) -> String {
        self.url.to_string()
    }
}

/// A response fetched from the network.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    /// Only successful responses are copied into cache partitions.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Error type for network fetches.
#[derive(Debug)]
pub enum FetchError {
    Timeout,
    Network(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Timeout => write!(f, "request timed out"),
            FetchError::Network(msg) => write!(f, "network error: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Object-safe fetch seam. The runtime uses [`HttpFetcher`]; tests inject a
/// scripted implementation to drive failure branches.
pub trait Fetch: Send + Sync {
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<FetchedResponse, FetchError>> + Send + 'a>>;
}

/// Fetcher backed by `reqwest` with a bounded per-request timeout.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?,
        })
    }
}

impl Fetch for HttpFetcher {
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<FetchedResponse, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(request.method.as_bytes())
                .map_err(|e| FetchError::Network(e.to_string()))?;

            let response = self
                .http
                .request(method, request.url.clone())
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        FetchError::Timeout
                    } else {
                        FetchError::Network(e.to_string())
                    }
                })?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response
                .bytes()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?
                .to_vec();

            Ok(FetchedResponse {
                status,
                headers,
                body,
            })
        })
    }
}
