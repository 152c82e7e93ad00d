pub mod cache;
pub mod cli;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod router;
pub mod server;
pub mod settings;
pub mod sync;
pub mod util;
pub mod worker;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
    cache::CacheStorage,
    cli::Command,
    router::{HttpFetcher, Router},
    server::{AppContext, ServerLimits},
    settings::Settings,
    sync::{FileQueue, MemoryQueue, SyncManager, SyncQueue},
    worker::{ClientRegistry, ServiceWorker},
};

pub async fn run(settings: Settings, command: Command) -> Result<()> {
    let worker = Arc::new(build_worker(&settings).await?);

    match command {
        Command::Serve => {
            match worker.install_and_activate().await {
                Ok(Some(report)) => info!(
                    deleted = report.deleted.len(),
                    claimed = report.claimed,
                    "worker active"
                ),
                Ok(None) => info!("worker installed and waiting"),
                Err(err) => warn!(error = %err, "install failed; requests pass through to the origin"),
            }
            let app = AppContext::new(
                worker,
                ServerLimits::from_settings(&settings),
                &settings.control_prefix,
            );
            tokio::select! {
                result = server::start_listener(settings.listen, app) => result,
                signal = tokio::signal::ctrl_c() => {
                    signal.context("failed to listen for shutdown signal")?;
                    info!("shutdown requested");
                    Ok(())
                }
            }
        }
        Command::Install => {
            let cached = worker.install().await.context("install failed")?;
            info!(
                cache = %worker.router().config().static_cache_name,
                cached,
                "install finished"
            );
            Ok(())
        }
        Command::Activate => {
            let report = match worker.install_and_activate().await.context("install failed")? {
                Some(report) => report,
                None => worker.activate().await.context("activation failed")?,
            };
            info!(
                deleted = ?report.deleted,
                "stale partitions removed"
            );
            Ok(())
        }
        Command::Sync { tag } => {
            let report = worker.sync(&tag).await?;
            info!(
                tag = %report.tag,
                sent = report.sent,
                remaining = report.remaining,
                "sync finished"
            );
            Ok(())
        }
    }
}

/// Assembles a worker over the storage, upstream and queues `settings` name.
pub async fn build_worker(settings: &Settings) -> Result<ServiceWorker> {
    let config = Arc::new(settings.router_config()?);
    let storage = match &settings.cache_dir {
        Some(dir) => CacheStorage::open_dir(dir.clone()).await?,
        None => CacheStorage::in_memory(),
    };
    let fetcher = Arc::new(HttpFetcher::new(
        &settings.origin,
        settings.upstream_timeout(),
    )?);
    let queue: Arc<dyn SyncQueue> = match &settings.sync_queue_dir {
        Some(dir) => Arc::new(FileQueue::open(dir.clone()).await?),
        None => Arc::new(MemoryQueue::new()),
    };

    let router = Router::new(config, storage, fetcher.clone());
    let sync = SyncManager::new(fetcher, queue, settings.sync_endpoints());
    Ok(ServiceWorker::new(
        router,
        Arc::new(ClientRegistry::new()),
        sync,
    ))
}
