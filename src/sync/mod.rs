//! Background sync: replay work queued while offline once connectivity
//! returns.
//!
//! A failed run returns an error and leaves unsent items queued; whoever fired
//! the tag fires it again later. There is no retry logic here.

mod queue;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use http::header::{self, HeaderValue};
use http::{Method, Uri};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

pub use queue::{FileQueue, MemoryQueue, QueuedItem, SyncQueue};

use crate::router::{Fetcher, Request};

pub const CART_SYNC: &str = "cart-sync";
pub const CONTACT_FORM_SYNC: &str = "contact-form-sync";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTag {
    CartSync,
    ContactFormSync,
    Unknown(String),
}

impl SyncTag {
    pub fn parse(tag: &str) -> Self {
        match tag {
            CART_SYNC => SyncTag::CartSync,
            CONTACT_FORM_SYNC => SyncTag::ContactFormSync,
            other => SyncTag::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SyncTag::CartSync => CART_SYNC,
            SyncTag::ContactFormSync => CONTACT_FORM_SYNC,
            SyncTag::Unknown(tag) => tag,
        }
    }
}

/// Where queued items are posted.
#[derive(Debug, Clone)]
pub struct SyncEndpoints {
    pub cart: String,
    pub contact: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub tag: String,
    pub sent: usize,
    pub remaining: usize,
}

pub struct SyncManager {
    fetcher: Arc<dyn Fetcher>,
    queue: Arc<dyn SyncQueue>,
    endpoints: SyncEndpoints,
}

impl SyncManager {
    pub fn new(fetcher: Arc<dyn Fetcher>, queue: Arc<dyn SyncQueue>, endpoints: SyncEndpoints) -> Self {
        Self {
            fetcher,
            queue,
            endpoints,
        }
    }

    pub fn queue(&self) -> &Arc<dyn SyncQueue> {
        &self.queue
    }

    pub async fn run(&self, tag: &str) -> Result<SyncReport> {
        let parsed = SyncTag::parse(tag);
        let result = match &parsed {
            SyncTag::CartSync => self.sync_cart().await,
            SyncTag::ContactFormSync => self.sync_contact_forms().await,
            SyncTag::Unknown(tag) => {
                debug!(tag = %tag, "ignoring unknown sync tag");
                return Ok(SyncReport {
                    tag: tag.clone(),
                    sent: 0,
                    remaining: 0,
                });
            }
        };
        crate::metrics::record_sync(parsed.as_str(), result.is_ok());
        result
    }

    /// Posts the whole cart queue as one JSON array and drops the posted items
    /// on success. Items queued during the post wait for the next run.
    async fn sync_cart(&self) -> Result<SyncReport> {
        let items = self.queue.pending(CART_SYNC).await?;
        if items.is_empty() {
            return Ok(SyncReport {
                tag: CART_SYNC.to_string(),
                sent: 0,
                remaining: 0,
            });
        }
        let payloads: Vec<&serde_json::Value> = items.iter().map(|item| &item.payload).collect();
        let body = serde_json::to_vec(&payloads)?;
        self.post(&self.endpoints.cart, body).await?;
        let sent: Vec<Uuid> = items.iter().map(|item| item.id).collect();
        self.queue.remove_many(CART_SYNC, &sent).await?;
        let remaining = self.queue.pending(CART_SYNC).await?.len();
        info!(tag = CART_SYNC, sent = sent.len(), remaining, "sync completed");
        Ok(SyncReport {
            tag: CART_SYNC.to_string(),
            sent: sent.len(),
            remaining,
        })
    }

    /// Posts contact submissions one at a time, dropping each from the queue
    /// once it is accepted. Stops at the first failure.
    async fn sync_contact_forms(&self) -> Result<SyncReport> {
        let items = self.queue.pending(CONTACT_FORM_SYNC).await?;
        let mut sent = 0;
        for item in &items {
            let body = serde_json::to_vec(&item.payload)?;
            self.post(&self.endpoints.contact, body)
                .await
                .with_context(|| format!("contact submission {} not delivered", item.id))?;
            self.queue.remove(CONTACT_FORM_SYNC, item.id).await?;
            sent += 1;
        }
        if sent > 0 {
            info!(tag = CONTACT_FORM_SYNC, sent, "sync completed");
        }
        Ok(SyncReport {
            tag: CONTACT_FORM_SYNC.to_string(),
            sent,
            remaining: items.len() - sent,
        })
    }

    async fn post(&self, endpoint: &str, body: Vec<u8>) -> Result<()> {
        let uri: Uri = endpoint
            .parse()
            .with_context(|| format!("invalid sync endpoint '{endpoint}'"))?;
        let request = Request::new(Method::POST, uri)
            .with_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .with_body(body);
        let response = self.fetcher.fetch(&request).await?;
        if !response.status.is_success() {
            bail!("sync endpoint {endpoint} answered {}", response.status);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{FetchError, Response};
    use crate::test_support::MockFetcher;
    use async_trait::async_trait;
    use http::{HeaderMap, StatusCode};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Accepts every post, queueing one more cart item while the first is in
    /// flight.
    struct EnqueueWhilePosting {
        queue: Arc<MemoryQueue>,
        enqueued: AtomicBool,
    }

    #[async_trait]
    impl Fetcher for EnqueueWhilePosting {
        async fn fetch(&self, _request: &Request) -> Result<Response, FetchError> {
            if !self.enqueued.swap(true, Ordering::SeqCst) {
                let _ = self.queue.push(CART_SYNC, json!({"sku": "LATE"})).await;
            }
            Ok(Response::new(StatusCode::OK, HeaderMap::new(), ""))
        }
    }

    fn endpoints() -> SyncEndpoints {
        SyncEndpoints {
            cart: "/api/cart/sync".into(),
            contact: "/api/contact".into(),
        }
    }

    #[tokio::test]
    async fn cart_sync_posts_batch_and_clears_queue() -> Result<()> {
        let fetcher = Arc::new(MockFetcher::new().with_ok("/api/cart/sync", ""));
        let queue = Arc::new(MemoryQueue::new());
        queue.push(CART_SYNC, json!({"sku": "A1"})).await?;
        queue.push(CART_SYNC, json!({"sku": "B2"})).await?;
        let manager = SyncManager::new(fetcher.clone(), queue.clone(), endpoints());

        let report = manager.run(CART_SYNC).await?;
        assert_eq!(report.sent, 2);
        assert!(queue.pending(CART_SYNC).await?.is_empty());

        let seen = fetcher.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::POST);
        let posted: serde_json::Value = serde_json::from_slice(&seen[0].body)?;
        assert_eq!(posted, json!([{"sku": "A1"}, {"sku": "B2"}]));
        Ok(())
    }

    #[tokio::test]
    async fn cart_sync_failure_keeps_queue() -> Result<()> {
        let fetcher = Arc::new(MockFetcher::new().with_status(
            "/api/cart/sync",
            StatusCode::SERVICE_UNAVAILABLE,
            "",
        ));
        let queue = Arc::new(MemoryQueue::new());
        queue.push(CART_SYNC, json!({"sku": "A1"})).await?;
        let manager = SyncManager::new(fetcher, queue.clone(), endpoints());

        assert!(manager.run(CART_SYNC).await.is_err());
        assert_eq!(queue.pending(CART_SYNC).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn cart_sync_keeps_items_queued_during_post() -> Result<()> {
        let queue = Arc::new(MemoryQueue::new());
        queue.push(CART_SYNC, json!({"sku": "A1"})).await?;
        let fetcher = Arc::new(EnqueueWhilePosting {
            queue: queue.clone(),
            enqueued: AtomicBool::new(false),
        });
        let manager = SyncManager::new(fetcher, queue.clone(), endpoints());

        let report = manager.run(CART_SYNC).await?;
        assert_eq!(report.sent, 1);
        assert_eq!(report.remaining, 1);
        let pending = queue.pending(CART_SYNC).await?;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload, json!({"sku": "LATE"}));

        let report = manager.run(CART_SYNC).await?;
        assert_eq!(report.sent, 1);
        assert!(queue.pending(CART_SYNC).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn contact_sync_posts_each_submission() -> Result<()> {
        let fetcher = Arc::new(MockFetcher::new().with_ok("/api/contact", ""));
        let queue = Arc::new(MemoryQueue::new());
        queue.push(CONTACT_FORM_SYNC, json!({"nombre": "Ana"})).await?;
        queue.push(CONTACT_FORM_SYNC, json!({"nombre": "Ken"})).await?;
        let manager = SyncManager::new(fetcher.clone(), queue.clone(), endpoints());

        let report = manager.run(CONTACT_FORM_SYNC).await?;
        assert_eq!(report.sent, 2);
        assert_eq!(fetcher.calls(), 2);
        assert!(queue.pending(CONTACT_FORM_SYNC).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn contact_sync_offline_propagates_error() -> Result<()> {
        let fetcher = Arc::new(MockFetcher::new());
        let queue = Arc::new(MemoryQueue::new());
        queue.push(CONTACT_FORM_SYNC, json!({"nombre": "Ana"})).await?;
        let manager = SyncManager::new(fetcher, queue.clone(), endpoints());

        assert!(manager.run(CONTACT_FORM_SYNC).await.is_err());
        assert_eq!(queue.pending(CONTACT_FORM_SYNC).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_tags_are_ignored() -> Result<()> {
        let fetcher = Arc::new(MockFetcher::new());
        let manager = SyncManager::new(fetcher.clone(), Arc::new(MemoryQueue::new()), endpoints());
        let report = manager.run("newsletter-sync").await?;
        assert_eq!(report.sent, 0);
        assert_eq!(fetcher.calls(), 0);
        Ok(())
    }
}
