//! Named cache partitions.
//!
//! A [`CacheStorage`] holds any number of partitions, each a map from request
//! URL to a stored [`Response`]. Partitions remember their creation order and
//! entries remember their insertion order through an explicit sequence number,
//! so lookups across partitions and oldest-first eviction do not depend on map
//! iteration order. With a cache directory configured, every write goes to disk
//! before it becomes visible and partitions are rebuilt on startup.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use http::Method;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task;
use tracing::{debug, trace, warn};

mod entry;
mod index;
mod key;
mod maintenance;
mod store;

use entry::{CacheEntry, PartitionDescriptor};
use index::PartitionIndex;
use key::CacheKey;
use maintenance::{prepare_layout_dir, spawn_dir_cleanup, tombstone};
use store::DiskStore;

use crate::router::{Request, Response};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("only GET requests can be cached (got {0})")]
    UnsupportedMethod(Method),
    #[error("cache partition '{0}' does not exist")]
    PartitionMissing(String),
    #[error("cache storage I/O failed: {0:#}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct CacheStorage {
    state: Arc<StorageState>,
}

struct StorageState {
    table: Mutex<PartitionTable>,
    disk: Option<DiskStore>,
    cache_root: Option<PathBuf>,
    next_seq: AtomicU64,
}

#[derive(Default)]
struct PartitionTable {
    partitions: HashMap<String, PartitionIndex>,
}

impl PartitionTable {
    /// Partition names ordered by creation.
    fn names(&self) -> Vec<String> {
        let mut named: Vec<(&String, u64)> = self
            .partitions
            .iter()
            .map(|(name, index)| (name, index.created_seq()))
            .collect();
        named.sort_by_key(|(_, seq)| *seq);
        named.into_iter().map(|(name, _)| name.clone()).collect()
    }
}

impl CacheStorage {
    /// Storage that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(StorageState {
                table: Mutex::new(PartitionTable::default()),
                disk: None,
                cache_root: None,
                next_seq: AtomicU64::new(1),
            }),
        }
    }

    /// Storage persisted under `cache_root`, rebuilt from whatever a previous
    /// run left there.
    pub async fn open_dir(cache_root: PathBuf) -> anyhow::Result<Self> {
        let (layout_dir, cleanup_dirs) = prepare_layout_dir(&cache_root).await?;
        spawn_dir_cleanup(cleanup_dirs);

        let disk = DiskStore::new(layout_dir);
        let loaded = {
            let disk = disk.clone();
            task::spawn_blocking(move || {
                disk.remove_temp_files()?;
                disk.load_partitions()
            })
            .await
            .map_err(|err| anyhow::anyhow!("cache rebuild task failed: {err}"))??
        };

        let mut table = PartitionTable::default();
        let mut max_seq = 0u64;
        for stored in loaded {
            let mut index = PartitionIndex::new(stored.descriptor.created_seq);
            max_seq = max_seq.max(stored.descriptor.created_seq);
            for entry in stored.entries {
                max_seq = max_seq.max(entry.seq);
                index.insert(entry);
            }
            debug!(
                partition = %stored.descriptor.name,
                entries = index.len(),
                "restored cache partition from disk"
            );
            table.partitions.insert(stored.descriptor.name, index);
        }

        Ok(Self {
            state: Arc::new(StorageState {
                table: Mutex::new(table),
                disk: Some(disk),
                cache_root: Some(cache_root),
                next_seq: AtomicU64::new(max_seq + 1),
            }),
        })
    }

    /// Opens `name`, creating an empty partition if it does not exist yet.
    pub async fn open(&self, name: &str) -> Result<Partition, CacheError> {
        let created_seq = {
            let mut table = self.state.table.lock();
            if table.partitions.contains_key(name) {
                None
            } else {
                let seq = self.state.next_seq();
                table
                    .partitions
                    .insert(name.to_string(), PartitionIndex::new(seq));
                Some(seq)
            }
        };

        if let (Some(created_seq), Some(disk)) = (created_seq, &self.state.disk) {
            let descriptor = PartitionDescriptor {
                name: name.to_string(),
                created_seq,
            };
            if let Err(err) = disk.create_partition_async(&descriptor).await {
                self.state.table.lock().partitions.remove(name);
                return Err(err.into());
            }
            trace!(partition = name, "created cache partition");
        }

        Ok(Partition {
            name: Arc::from(name),
            storage: self.clone(),
        })
    }

    pub fn has(&self, name: &str) -> bool {
        self.state.table.lock().partitions.contains_key(name)
    }

    /// Partition names in creation order.
    pub fn keys(&self) -> Vec<String> {
        self.state.table.lock().names()
    }

    /// Deletes a partition and everything in it. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let removed = self.state.table.lock().partitions.remove(name);
        if removed.is_none() {
            return Ok(false);
        }

        if let (Some(disk), Some(root)) = (&self.state.disk, &self.state.cache_root) {
            let dir = disk.partition_dir(name);
            if dir.exists() {
                let tombstoned = tombstone(root, &dir).await?;
                spawn_dir_cleanup(vec![tombstoned]);
            }
        }
        Ok(true)
    }

    /// First stored response for `request` across all partitions, oldest
    /// partition first. Only GET requests match.
    pub fn match_any(&self, request: &Request) -> Option<Response> {
        if request.method != Method::GET {
            crate::metrics::record_cache_lookup(false);
            return None;
        }
        let url = request.url();
        let table = self.state.table.lock();
        let hit = table.names().into_iter().find_map(|name| {
            table
                .partitions
                .get(&name)
                .and_then(|index| index.get(&url))
                .map(|entry| entry.response.clone())
        });
        crate::metrics::record_cache_lookup(hit.is_some());
        hit
    }

    /// Evicts the oldest entries of `name` one at a time until at most
    /// `max_items` remain. Returns the number of evicted entries.
    pub async fn limit_cache_size(&self, name: &str, max_items: usize) -> Result<usize, CacheError> {
        let mut evicted = 0;
        loop {
            let oldest = {
                let table = self.state.table.lock();
                let Some(index) = table.partitions.get(name) else {
                    return Ok(evicted);
                };
                if index.len() <= max_items {
                    return Ok(evicted);
                }
                index.oldest_url().map(str::to_string)
            };
            let Some(url) = oldest else {
                return Ok(evicted);
            };
            if self.remove_entry(name, &url).await {
                trace!(partition = name, url = %url, "evicted cache entry");
                crate::metrics::record_cache_eviction();
                evicted += 1;
            }
        }
    }

    fn insert_entries(&self, name: &str, entries: Vec<CacheEntry>) -> Result<(), CacheError> {
        let mut table = self.state.table.lock();
        let index = table
            .partitions
            .get_mut(name)
            .ok_or_else(|| CacheError::PartitionMissing(name.to_string()))?;
        for entry in entries {
            index.insert(entry);
        }
        Ok(())
    }

    async fn remove_entry(&self, name: &str, url: &str) -> bool {
        let removed = {
            let mut table = self.state.table.lock();
            table
                .partitions
                .get_mut(name)
                .and_then(|index| index.remove(url))
        };
        let Some(removed) = removed else {
            return false;
        };
        if let Some(disk) = &self.state.disk {
            disk.remove_entry_async(name, &removed.entry_id).await;
        }
        true
    }

    fn build_entry(&self, request: &Request, response: Response) -> Result<CacheEntry, CacheError> {
        if request.method != Method::GET {
            return Err(CacheError::UnsupportedMethod(request.method.clone()));
        }
        let key = CacheKey::for_request(request);
        Ok(CacheEntry::new(
            self.state.next_seq(),
            key.entry_id().to_string(),
            key.url().to_string(),
            response,
        ))
    }
}

impl StorageState {
    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }
}

/// Handle to one named partition.
#[derive(Clone)]
pub struct Partition {
    name: Arc<str>,
    storage: CacheStorage,
}

impl Partition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, request: &Request) -> Option<Response> {
        if request.method != Method::GET {
            return None;
        }
        let url = request.url();
        let table = self.storage.state.table.lock();
        table
            .partitions
            .get(self.name())
            .and_then(|index| index.get(&url))
            .map(|entry| entry.response.clone())
    }

    /// Stores `response` under the request URL, replacing any previous entry.
    pub async fn put(&self, request: &Request, response: Response) -> Result<(), CacheError> {
        self.put_all(vec![(request.clone(), response)]).await
    }

    /// Stores every pair or none of them.
    pub async fn put_all(&self, items: Vec<(Request, Response)>) -> Result<(), CacheError> {
        let mut entries = Vec::with_capacity(items.len());
        for (request, response) in items {
            entries.push(self.storage.build_entry(&request, response)?);
        }

        // Nothing replaces an existing file until every entry is staged.
        if let Some(disk) = &self.storage.state.disk {
            let mut staged = Vec::with_capacity(entries.len());
            for entry in &entries {
                match disk.stage_entry_async(self.name(), entry).await {
                    Ok(entry) => staged.push(entry),
                    Err(err) => {
                        disk.discard_staged(&staged).await;
                        return Err(err.into());
                    }
                }
            }
            for (committed, entry) in staged.iter().enumerate() {
                if let Err(err) = disk.commit_staged(entry).await {
                    disk.discard_staged(&staged[committed..]).await;
                    // Committed files already replaced whatever was indexed
                    // under those URLs.
                    for done in &entries[..committed] {
                        self.storage.remove_entry(self.name(), &done.url).await;
                        disk.remove_entry_async(self.name(), &done.entry_id).await;
                    }
                    return Err(err.into());
                }
            }
        }

        let stored = entries.len();
        match self.storage.insert_entries(self.name(), entries) {
            Ok(()) => {
                crate::metrics::record_cache_store(stored);
                Ok(())
            }
            Err(err) => {
                warn!(partition = self.name(), "partition deleted during write");
                Err(err)
            }
        }
    }

    pub async fn delete(&self, request: &Request) -> bool {
        self.storage.remove_entry(self.name(), &request.url()).await
    }

    /// Stored URLs in insertion order.
    pub fn keys(&self) -> Vec<String> {
        let table = self.storage.state.table.lock();
        table
            .partitions
            .get(self.name())
            .map(PartitionIndex::urls)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        let table = self.storage.state.table.lock();
        table
            .partitions
            .get(self.name())
            .map(PartitionIndex::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
