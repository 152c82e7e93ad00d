use http::StatusCode;
use tracing::debug;

use super::classify::RequestClass;
use super::request::Request;
use super::response::Response;
use super::writeback::{StoreOutcome, store_best_effort, store_capped};
use super::{ResponseSource, RouteOutcome, Routed, Router};

impl Router {
    /// Network first. Successful (2xx) responses go to the dynamic partition;
    /// on transport failure serve any cached copy, then the offline document.
    pub(super) async fn navigation(&self, request: &Request) -> Routed {
        let class = RequestClass::Navigation;
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                let stored = if response.status.is_success() {
                    store_best_effort(
                        &self.storage,
                        &self.config.dynamic_cache_name,
                        request,
                        &response,
                    )
                    .await
                } else {
                    StoreOutcome::NotAttempted
                };
                Routed::respond(class, response, ResponseSource::Network, stored)
            }
            Err(err) => {
                debug!(url = %request.url(), error = %err, "navigation failed; trying cache");
                if let Some(cached) = self.storage.match_any(request) {
                    return Routed::respond(
                        class,
                        cached,
                        ResponseSource::Cache,
                        StoreOutcome::NotAttempted,
                    );
                }
                match self.cached_path(&self.config.offline_document) {
                    Some(offline) => Routed::respond(
                        class,
                        offline,
                        ResponseSource::Fallback,
                        StoreOutcome::NotAttempted,
                    ),
                    None => Routed::network_error(class),
                }
            }
        }
    }

    /// Cache first. Exactly-200 network responses go to the static partition.
    pub(super) async fn static_asset(&self, request: &Request) -> Routed {
        let class = RequestClass::StaticAsset;
        if let Some(cached) = self.storage.match_any(request) {
            return Routed::respond(class, cached, ResponseSource::Cache, StoreOutcome::NotAttempted);
        }
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                let stored = if response.status == StatusCode::OK {
                    store_best_effort(
                        &self.storage,
                        &self.config.static_cache_name,
                        request,
                        &response,
                    )
                    .await
                } else {
                    StoreOutcome::NotAttempted
                };
                Routed::respond(class, response, ResponseSource::Network, stored)
            }
            Err(err) => {
                debug!(url = %request.url(), error = %err, "static asset unavailable");
                Routed::respond(
                    class,
                    Response::not_found(),
                    ResponseSource::None,
                    StoreOutcome::NotAttempted,
                )
            }
        }
    }

    /// Cache first. Exactly-200 network responses go to the dynamic partition,
    /// which is then trimmed to the image cap.
    pub(super) async fn image(&self, request: &Request) -> Routed {
        let class = RequestClass::Image;
        if let Some(cached) = self.storage.match_any(request) {
            return Routed::respond(class, cached, ResponseSource::Cache, StoreOutcome::NotAttempted);
        }
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                let stored = if response.status == StatusCode::OK {
                    store_capped(
                        &self.storage,
                        &self.config.dynamic_cache_name,
                        request,
                        &response,
                        self.config.max_dynamic_image_entries,
                    )
                    .await
                } else {
                    StoreOutcome::NotAttempted
                };
                Routed::respond(class, response, ResponseSource::Network, stored)
            }
            Err(err) => {
                debug!(url = %request.url(), error = %err, "image unavailable; serving offline image");
                let offline = self
                    .cached_path(&self.config.offline_image)
                    .unwrap_or_else(Response::offline_image_placeholder);
                Routed::respond(
                    class,
                    offline,
                    ResponseSource::Fallback,
                    StoreOutcome::NotAttempted,
                )
            }
        }
    }

    /// Network first for freshness; no fallback document.
    pub(super) async fn api_data(&self, request: &Request) -> Routed {
        let class = RequestClass::ApiData;
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                let stored = if response.status == StatusCode::OK {
                    store_best_effort(
                        &self.storage,
                        &self.config.dynamic_cache_name,
                        request,
                        &response,
                    )
                    .await
                } else {
                    StoreOutcome::NotAttempted
                };
                Routed::respond(class, response, ResponseSource::Network, stored)
            }
            Err(err) => {
                debug!(url = %request.url(), error = %err, "api request failed; trying cache");
                match self.storage.match_any(request) {
                    Some(cached) => Routed::respond(
                        class,
                        cached,
                        ResponseSource::Cache,
                        StoreOutcome::NotAttempted,
                    ),
                    None => Routed::network_error(class),
                }
            }
        }
    }

    /// Cache, then network, then an empty 404. Nothing is stored.
    pub(super) async fn other(&self, request: &Request) -> Routed {
        let class = RequestClass::Other;
        if let Some(cached) = self.storage.match_any(request) {
            return Routed::respond(class, cached, ResponseSource::Cache, StoreOutcome::NotAttempted);
        }
        match self.fetcher.fetch(request).await {
            Ok(response) => Routed::respond(
                class,
                response,
                ResponseSource::Network,
                StoreOutcome::NotAttempted,
            ),
            Err(err) => {
                debug!(url = %request.url(), error = %err, "request unavailable");
                Routed::respond(
                    class,
                    Response::not_found(),
                    ResponseSource::None,
                    StoreOutcome::NotAttempted,
                )
            }
        }
    }

    fn cached_path(&self, path: &str) -> Option<Response> {
        let request = Request::get(path).ok()?;
        self.storage.match_any(&request)
    }
}
