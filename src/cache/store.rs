use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blake3::Hasher;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use super::entry::{CacheEntry, PartitionDescriptor, PersistedEntry};
use super::key::{CacheKey, partition_dir_name};

pub(super) const DESCRIPTOR_FILE: &str = "partition.json";
const TEMP_PREFIX: &str = "tmp_";

/// Body and metadata written to temp files, waiting to be renamed into place.
#[derive(Debug)]
pub(super) struct StagedEntry {
    body_temp: PathBuf,
    meta_temp: PathBuf,
    body_path: PathBuf,
    meta_path: PathBuf,
}

/// One partition as found on disk during a rebuild.
#[derive(Debug)]
pub(super) struct StoredPartition {
    pub descriptor: PartitionDescriptor,
    pub entries: Vec<CacheEntry>,
}

/// On-disk layout: `<root>/<partition dir>/<ab>/<cd>/<entry id>` plus a
/// `.meta` sidecar per body.
#[derive(Debug, Clone)]
pub(super) struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub(super) fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub(super) fn partition_dir(&self, name: &str) -> PathBuf {
        self.root.join(partition_dir_name(name))
    }

    pub(super) fn body_path(&self, partition: &str, entry_id: &str) -> PathBuf {
        let (first, remainder) = entry_id.split_at(2);
        let (second, _) = remainder.split_at(2);
        self.partition_dir(partition)
            .join(first)
            .join(second)
            .join(entry_id)
    }

    pub(super) fn meta_path(&self, partition: &str, entry_id: &str) -> PathBuf {
        let mut path = self.body_path(partition, entry_id);
        path.set_extension("meta");
        path
    }

    fn temp_path(&self) -> PathBuf {
        self.root
            .join(format!("{TEMP_PREFIX}{}", uuid::Uuid::new_v4()))
    }

    pub(super) async fn create_partition_async(&self, descriptor: &PartitionDescriptor) -> Result<()> {
        let dir = self.partition_dir(&descriptor.name);
        async_fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create partition dir {}", dir.display()))?;
        let data = serde_json::to_vec(descriptor)?;
        write_private_file(&dir.join(DESCRIPTOR_FILE), &data).await
    }

    /// Writes body and metadata to temp files without touching the entry's
    /// current files.
    pub(super) async fn stage_entry_async(&self, partition: &str, entry: &CacheEntry) -> Result<StagedEntry> {
        let body_path = self.body_path(partition, &entry.entry_id);
        if let Some(parent) = body_path.parent() {
            async_fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create cache shard {}", parent.display()))?;
        }
        let staged = StagedEntry {
            body_temp: self.temp_path(),
            meta_temp: self.temp_path(),
            meta_path: self.meta_path(partition, &entry.entry_id),
            body_path,
        };

        let meta = serde_json::to_vec(&entry.to_persisted())?;
        let written = match write_private_file(&staged.body_temp, &entry.response.body).await {
            Ok(()) => write_private_file(&staged.meta_temp, &meta).await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            self.discard_staged(std::slice::from_ref(&staged)).await;
            return Err(err);
        }
        Ok(staged)
    }

    /// Moves a staged body, then its sidecar, into place. A crash in between
    /// leaves a body whose hash no longer matches and is dropped on rebuild.
    pub(super) async fn commit_staged(&self, staged: &StagedEntry) -> Result<()> {
        async_fs::rename(&staged.body_temp, &staged.body_path)
            .await
            .with_context(|| format!("failed to move cache body into {}", staged.body_path.display()))?;
        async_fs::rename(&staged.meta_temp, &staged.meta_path)
            .await
            .with_context(|| format!("failed to move cache metadata into {}", staged.meta_path.display()))
    }

    pub(super) async fn discard_staged(&self, staged: &[StagedEntry]) {
        for entry in staged {
            let _ = async_fs::remove_file(&entry.body_temp).await;
            let _ = async_fs::remove_file(&entry.meta_temp).await;
        }
    }

    pub(super) async fn remove_entry_async(&self, partition: &str, entry_id: &str) {
        let _ = async_fs::remove_file(self.body_path(partition, entry_id)).await;
        let _ = async_fs::remove_file(self.meta_path(partition, entry_id)).await;
    }

    pub(super) fn remove_temp_files(&self) -> Result<()> {
        if !self.root.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|name| name.starts_with(TEMP_PREFIX))
                    .unwrap_or(false)
            {
                fs::remove_file(&path).ok();
            }
        }
        Ok(())
    }

    /// Reads every partition under the root. Entries whose metadata, key or
    /// content hash do not check out are removed from disk and skipped.
    pub(super) fn load_partitions(&self) -> Result<Vec<StoredPartition>> {
        let mut partitions = Vec::new();
        let dirs = match fs::read_dir(&self.root) {
            Ok(dirs) => dirs,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(partitions),
            Err(err) => return Err(err.into()),
        };

        for dir in dirs {
            let dir = dir?;
            if !dir.file_type()?.is_dir() {
                continue;
            }
            let descriptor_path = dir.path().join(DESCRIPTOR_FILE);
            let descriptor: PartitionDescriptor = match fs::read(&descriptor_path)
                .map_err(anyhow::Error::from)
                .and_then(|data| serde_json::from_slice(&data).map_err(anyhow::Error::from))
            {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    warn!(
                        error = %err,
                        path = %dir.path().display(),
                        "skipping cache partition without a readable descriptor"
                    );
                    continue;
                }
            };
            if partition_dir_name(&descriptor.name) != dir.file_name().to_string_lossy() {
                warn!(
                    partition = %descriptor.name,
                    path = %dir.path().display(),
                    "cache partition descriptor does not match its directory; skipping"
                );
                continue;
            }

            let entries = self.load_entries(&descriptor.name, &dir.path())?;
            partitions.push(StoredPartition {
                descriptor,
                entries,
            });
        }

        Ok(partitions)
    }

    fn load_entries(&self, partition: &str, dir: &Path) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        for shard1 in fs::read_dir(dir)? {
            let shard1 = shard1?;
            if !shard1.file_type()?.is_dir() {
                continue;
            }
            for shard2 in fs::read_dir(shard1.path())? {
                let shard2 = shard2?;
                if !shard2.file_type()?.is_dir() {
                    continue;
                }
                for file in fs::read_dir(shard2.path())? {
                    let path = file?.path();
                    if path.extension().and_then(|ext| ext.to_str()) != Some("meta") {
                        continue;
                    }
                    if let Some(entry) = self.restore_entry(partition, &path) {
                        entries.push(entry);
                    }
                }
            }
        }
        entries.sort_by_key(|entry| entry.seq);
        Ok(entries)
    }

    fn restore_entry(&self, partition: &str, meta_path: &Path) -> Option<CacheEntry> {
        let persisted: PersistedEntry = match fs::read(meta_path)
            .map_err(anyhow::Error::from)
            .and_then(|data| serde_json::from_slice(&data).map_err(anyhow::Error::from))
        {
            Ok(persisted) => persisted,
            Err(err) => {
                warn!(
                    error = %err,
                    path = %meta_path.display(),
                    "failed to read cache metadata; removing entry"
                );
                self.remove_entry_files_from_meta(partition, meta_path);
                return None;
            }
        };

        let key = CacheKey::from_url(persisted.url.clone());
        let file_stem = meta_path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        if key.entry_id() != file_stem {
            warn!(
                expected = key.entry_id(),
                actual = file_stem,
                "cache metadata key mismatch; removing entry"
            );
            self.remove_entry_files_from_meta(partition, meta_path);
            return None;
        }

        let body_path = self.body_path(partition, key.entry_id());
        let body = match fs::read(&body_path) {
            Ok(body) => body,
            Err(_) => {
                self.remove_entry_files_from_meta(partition, meta_path);
                return None;
            }
        };
        if body.len() as u64 != persisted.content_length
            || !content_hash_matches(&body, &persisted.content_hash)
        {
            warn!(
                path = %body_path.display(),
                "cache content hash mismatch; removing entry"
            );
            self.remove_entry_files_from_meta(partition, meta_path);
            return None;
        }

        Some(CacheEntry::from_persisted(
            persisted,
            key.entry_id().to_string(),
            body,
        ))
    }

    fn remove_entry_files_from_meta(&self, partition: &str, meta_path: &Path) {
        if let Some(stem) = meta_path.file_stem().and_then(|s| s.to_str())
            && stem.len() >= 4
        {
            fs::remove_file(self.body_path(partition, stem)).ok();
        }
        fs::remove_file(meta_path).ok();
    }
}

fn content_hash_matches(body: &[u8], expected_hex: &str) -> bool {
    let mut hasher = Hasher::new();
    hasher.update(body);
    hasher.finalize().to_hex().as_str() == expected_hex
}

async fn write_private_file(path: &Path, data: &[u8]) -> Result<()> {
    let mut options = async_fs::OpenOptions::new();
    options.create(true).truncate(true).write(true);
    #[cfg(unix)]
    {
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .await
        .with_context(|| format!("failed to open cache file {}", path.display()))?;
    file.write_all(data).await?;
    file.flush().await?;
    Ok(())
}
