use std::time::Duration;

use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use http::HeaderMap;
use http::header::{self, HeaderName};
use thiserror::Error;
use tracing::trace;

use super::request::Request;
use super::response::Response;

const USER_AGENT: &str = concat!("offline-router/", env!("CARGO_PKG_VERSION"));

/// Transport-level failure. An HTTP error status is a response, not a `FetchError`.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network request for {url} failed: {reason}")]
    Network { url: String, reason: String },
    #[error("failed to read response body for {url}: {reason}")]
    Body { url: String, reason: String },
}

impl FetchError {
    pub fn network(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// The network seam: everything the router and the sync handlers send upstream
/// goes through a `Fetcher`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Fetches over HTTP(S), resolving origin-relative URIs against a base origin.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    origin: String,
}

impl HttpFetcher {
    pub fn new(origin: &str, timeout: Duration) -> Result<Self> {
        let origin = origin.trim_end_matches('/').to_string();
        ensure!(
            origin.starts_with("http://") || origin.starts_with("https://"),
            "origin must be an http(s) URL (got '{origin}')"
        );
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, origin })
    }

    fn resolve(&self, request: &Request) -> String {
        if request.uri.scheme().is_some() {
            request.url()
        } else {
            format!("{}{}", self.origin, request.url())
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = self.resolve(request);
        trace!(url = %url, method = %request.method, "fetching from network");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(forwardable_headers(&request.headers));
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|err| FetchError::network(&url, err.to_string()))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|err| FetchError::Body {
            url: url.clone(),
            reason: err.to_string(),
        })?;
        Ok(Response::new(status, headers, body))
    }
}

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub(crate) fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Drops hop-by-hop headers plus `Host` and `Content-Length`, which the client
/// recomputes for the upstream request.
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if is_hop_by_hop(name) || name == header::HOST || name == header::CONTENT_LENGTH {
            continue;
        }
        forwarded.append(name.clone(), value.clone());
    }
    forwarded
}
