use http::Method;
use tracing::{trace, warn};

use super::request::Request;
use super::response::Response;
use crate::cache::CacheStorage;

/// What happened to the copy meant for the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    NotAttempted,
    Stored,
    Failed,
}

impl StoreOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            StoreOutcome::NotAttempted => "none",
            StoreOutcome::Stored => "stored",
            StoreOutcome::Failed => "failed",
        }
    }
}

/// Stores an independent copy of `response` in `partition`. Failures are
/// logged and counted; the caller's response is never affected. Only GET
/// responses are cacheable, so other methods are skipped.
pub(super) async fn store_best_effort(
    storage: &CacheStorage,
    partition: &str,
    request: &Request,
    response: &Response,
) -> StoreOutcome {
    if request.method != Method::GET {
        trace!(partition, method = %request.method, "skipping store for non-GET request");
        return StoreOutcome::NotAttempted;
    }
    let result = match storage.open(partition).await {
        Ok(handle) => handle.put(request, response.clone()).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => {
            trace!(partition, url = %request.url(), "stored response");
            StoreOutcome::Stored
        }
        Err(err) => {
            warn!(
                partition,
                url = %request.url(),
                error = %err,
                "failed to store response in cache"
            );
            crate::metrics::record_cache_store_error(partition);
            StoreOutcome::Failed
        }
    }
}

/// Stores like [`store_best_effort`], then trims `partition` to `max_items`
/// oldest-first.
pub(super) async fn store_capped(
    storage: &CacheStorage,
    partition: &str,
    request: &Request,
    response: &Response,
    max_items: usize,
) -> StoreOutcome {
    let outcome = store_best_effort(storage, partition, request, response).await;
    if outcome == StoreOutcome::Stored
        && let Err(err) = storage.limit_cache_size(partition, max_items).await
    {
        warn!(partition, error = %err, "failed to enforce cache size limit");
    }
    outcome
}
