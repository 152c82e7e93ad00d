//! Request routing: classify each intercepted request and answer it from the
//! cache, the network, or an offline fallback.

mod classify;
mod fetch;
mod request;
mod response;
mod strategy;
mod writeback;

use std::sync::Arc;

use crate::cache::CacheStorage;
use crate::config::RouterConfig;

pub use classify::{RequestClass, classify};
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub(crate) use fetch::is_hop_by_hop;
pub use request::{Request, RequestDestination, RequestMode};
pub use response::Response;
pub use writeback::StoreOutcome;

/// What the router decided to do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The router declines; the request should go to the network untouched.
    Passthrough,
    Respond(Response),
    /// Neither the network nor the cache could answer and there is no fallback.
    NetworkError,
}

/// Where the returned response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    Fallback,
    None,
}

impl ResponseSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            ResponseSource::Cache => "cache",
            ResponseSource::Network => "network",
            ResponseSource::Fallback => "fallback",
            ResponseSource::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteReport {
    pub class: RequestClass,
    pub source: ResponseSource,
    pub stored: StoreOutcome,
}

#[derive(Debug, Clone)]
pub struct Routed {
    pub outcome: RouteOutcome,
    pub report: RouteReport,
}

impl Routed {
    fn respond(
        class: RequestClass,
        response: Response,
        source: ResponseSource,
        stored: StoreOutcome,
    ) -> Self {
        Self {
            outcome: RouteOutcome::Respond(response),
            report: RouteReport {
                class,
                source,
                stored,
            },
        }
    }

    fn network_error(class: RequestClass) -> Self {
        Self {
            outcome: RouteOutcome::NetworkError,
            report: RouteReport {
                class,
                source: ResponseSource::None,
                stored: StoreOutcome::NotAttempted,
            },
        }
    }

    pub(crate) fn passthrough() -> Self {
        Self {
            outcome: RouteOutcome::Passthrough,
            report: RouteReport {
                class: RequestClass::Ignored,
                source: ResponseSource::None,
                stored: StoreOutcome::NotAttempted,
            },
        }
    }

    /// The response, if the router produced one.
    pub fn response(&self) -> Option<&Response> {
        match &self.outcome {
            RouteOutcome::Respond(response) => Some(response),
            _ => None,
        }
    }
}

/// Per-class cache strategies over one version's pair of partitions.
#[derive(Clone)]
pub struct Router {
    config: Arc<RouterConfig>,
    storage: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
}

impl Router {
    pub fn new(config: Arc<RouterConfig>, storage: CacheStorage, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            storage,
            fetcher,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    pub async fn route(&self, request: &Request) -> Routed {
        let class = classify(request);
        let routed = match class {
            RequestClass::Ignored => Routed::passthrough(),
            RequestClass::Navigation => self.navigation(request).await,
            RequestClass::StaticAsset => self.static_asset(request).await,
            RequestClass::Image => self.image(request).await,
            RequestClass::ApiData => self.api_data(request).await,
            RequestClass::Other => self.other(request).await,
        };
        crate::metrics::record_route(routed.report.class.as_str(), routed.report.source.as_str());
        routed
    }
}
