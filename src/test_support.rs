use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;

use crate::router::{FetchError, Fetcher, Request, Response};

/// Canned upstream keyed by request URL. Unknown URLs fail like a dropped
/// connection.
#[derive(Default)]
pub(crate) struct MockFetcher {
    routes: HashMap<String, Response>,
    offline: AtomicBool,
    calls: AtomicUsize,
    seen: Mutex<Vec<Request>>,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_ok(self, url: &str, body: impl Into<Bytes>) -> Self {
        self.with_status(url, StatusCode::OK, body)
    }

    pub(crate) fn with_status(mut self, url: &str, status: StatusCode, body: impl Into<Bytes>) -> Self {
        self.routes
            .insert(url.to_string(), Response::new(status, HeaderMap::new(), body));
        self
    }

    pub(crate) fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn seen(&self) -> Vec<Request> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(request.clone());
        let url = request.url();
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::network(url, "offline"));
        }
        self.routes
            .get(&url)
            .cloned()
            .ok_or_else(|| FetchError::network(url, "connection refused"))
    }
}
