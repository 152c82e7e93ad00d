use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// One deferred mutation waiting for connectivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedItem {
    pub id: Uuid,
    pub payload: serde_json::Value,
}

/// Durable storage for work queued by pages while offline, keyed by sync tag.
#[async_trait]
pub trait SyncQueue: Send + Sync {
    async fn push(&self, tag: &str, payload: serde_json::Value) -> Result<QueuedItem>;
    /// Items for `tag` in the order they were queued.
    async fn pending(&self, tag: &str) -> Result<Vec<QueuedItem>>;
    async fn remove(&self, tag: &str, id: Uuid) -> Result<()>;
    /// Drops exactly `ids`; items queued since they were read stay.
    async fn remove_many(&self, tag: &str, ids: &[Uuid]) -> Result<()>;
    async fn clear(&self, tag: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryQueue {
    items: Mutex<HashMap<String, Vec<QueuedItem>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncQueue for MemoryQueue {
    async fn push(&self, tag: &str, payload: serde_json::Value) -> Result<QueuedItem> {
        let item = QueuedItem {
            id: Uuid::new_v4(),
            payload,
        };
        self.items
            .lock()
            .entry(tag.to_string())
            .or_default()
            .push(item.clone());
        Ok(item)
    }

    async fn pending(&self, tag: &str) -> Result<Vec<QueuedItem>> {
        Ok(self.items.lock().get(tag).cloned().unwrap_or_default())
    }

    async fn remove(&self, tag: &str, id: Uuid) -> Result<()> {
        if let Some(items) = self.items.lock().get_mut(tag) {
            items.retain(|item| item.id != id);
        }
        Ok(())
    }

    async fn remove_many(&self, tag: &str, ids: &[Uuid]) -> Result<()> {
        if let Some(items) = self.items.lock().get_mut(tag) {
            items.retain(|item| !ids.contains(&item.id));
        }
        Ok(())
    }

    async fn clear(&self, tag: &str) -> Result<()> {
        self.items.lock().remove(tag);
        Ok(())
    }
}

/// One JSON file per tag under `dir`. Updates go through a temp file and a
/// rename so a crash leaves either the old or the new list.
#[derive(Debug)]
pub struct FileQueue {
    dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileQueue {
    pub async fn open(dir: PathBuf) -> Result<Self> {
        async_fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create sync queue dir {}", dir.display()))?;
        Ok(Self {
            dir,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn tag_path(&self, tag: &str) -> Result<PathBuf> {
        ensure!(
            !tag.is_empty()
                && tag
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'),
            "invalid sync tag '{tag}'"
        );
        Ok(self.dir.join(format!("{tag}.json")))
    }

    async fn read(&self, tag: &str) -> Result<Vec<QueuedItem>> {
        let path = self.tag_path(tag)?;
        match async_fs::read(&path).await {
            Ok(data) => serde_json::from_slice(&data)
                .with_context(|| format!("failed to parse sync queue {}", path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err)
                .with_context(|| format!("failed to read sync queue {}", path.display())),
        }
    }

    async fn write(&self, tag: &str, items: &[QueuedItem]) -> Result<()> {
        let path = self.tag_path(tag)?;
        if items.is_empty() {
            return match async_fs::remove_file(&path).await {
                Err(err) if err.kind() != ErrorKind::NotFound => Err(err)
                    .with_context(|| format!("failed to remove sync queue {}", path.display())),
                _ => Ok(()),
            };
        }
        let data = serde_json::to_vec_pretty(items)?;
        let temp_path = self.dir.join(format!("tmp_{}", Uuid::new_v4()));
        let mut file = async_fs::File::create(&temp_path)
            .await
            .with_context(|| format!("failed to create {}", temp_path.display()))?;
        file.write_all(&data).await?;
        file.flush().await?;
        drop(file);
        if let Err(err) = async_fs::rename(&temp_path, &path).await {
            let _ = async_fs::remove_file(&temp_path).await;
            return Err(err)
                .with_context(|| format!("failed to replace sync queue {}", path.display()));
        }
        Ok(())
    }
}

#[async_trait]
impl SyncQueue for FileQueue {
    async fn push(&self, tag: &str, payload: serde_json::Value) -> Result<QueuedItem> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.read(tag).await?;
        let item = QueuedItem {
            id: Uuid::new_v4(),
            payload,
        };
        items.push(item.clone());
        self.write(tag, &items).await?;
        Ok(item)
    }

    async fn pending(&self, tag: &str) -> Result<Vec<QueuedItem>> {
        self.read(tag).await
    }

    async fn remove(&self, tag: &str, id: Uuid) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.read(tag).await?;
        items.retain(|item| item.id != id);
        self.write(tag, &items).await
    }

    async fn remove_many(&self, tag: &str, ids: &[Uuid]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.read(tag).await?;
        items.retain(|item| !ids.contains(&item.id));
        self.write(tag, &items).await
    }

    async fn clear(&self, tag: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(tag, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn memory_queue_keeps_order_per_tag() -> Result<()> {
        let queue = MemoryQueue::new();
        let first = queue.push("cart-sync", json!({"sku": "A1"})).await?;
        queue.push("cart-sync", json!({"sku": "B2"})).await?;
        queue.push("contact-form-sync", json!({"email": "a@b.jp"})).await?;

        let cart = queue.pending("cart-sync").await?;
        assert_eq!(cart.len(), 2);
        assert_eq!(cart[0].id, first.id);

        queue.remove("cart-sync", first.id).await?;
        assert_eq!(queue.pending("cart-sync").await?.len(), 1);
        queue.clear("cart-sync").await?;
        assert!(queue.pending("cart-sync").await?.is_empty());
        assert_eq!(queue.pending("contact-form-sync").await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn file_queue_persists_across_instances() -> Result<()> {
        let dir = TempDir::new()?;
        let item = {
            let queue = FileQueue::open(dir.path().to_path_buf()).await?;
            queue.push("cart-sync", json!({"sku": "A1", "qty": 2})).await?
        };

        let queue = FileQueue::open(dir.path().to_path_buf()).await?;
        assert_eq!(queue.pending("cart-sync").await?, vec![item.clone()]);
        queue.remove("cart-sync", item.id).await?;
        assert!(queue.pending("cart-sync").await?.is_empty());
        assert!(!dir.path().join("cart-sync.json").exists());
        Ok(())
    }

    #[tokio::test]
    async fn file_queue_remove_many_keeps_newer_items() -> Result<()> {
        let dir = TempDir::new()?;
        let queue = FileQueue::open(dir.path().to_path_buf()).await?;
        let first = queue.push("cart-sync", json!({"sku": "A1"})).await?;
        let second = queue.push("cart-sync", json!({"sku": "B2"})).await?;
        let late = queue.push("cart-sync", json!({"sku": "C3"})).await?;

        queue.remove_many("cart-sync", &[first.id, second.id]).await?;
        assert_eq!(queue.pending("cart-sync").await?, vec![late]);
        Ok(())
    }

    #[tokio::test]
    async fn file_queue_rejects_path_like_tags() -> Result<()> {
        let dir = TempDir::new()?;
        let queue = FileQueue::open(dir.path().to_path_buf()).await?;
        assert!(queue.push("../escape", json!({})).await.is_err());
        assert!(queue.pending("").await.is_err());
        Ok(())
    }
}
