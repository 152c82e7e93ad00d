use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs as async_fs;
use tracing::warn;

const CACHE_LAYOUT_VERSION: u32 = 1;
const CACHE_LAYOUT_PREFIX: &str = "layout-v";
const CACHE_TOMBSTONE_PREFIX: &str = "tombstone-";

pub(super) fn layout_dir(root: &Path) -> PathBuf {
    root.join(format!("{CACHE_LAYOUT_PREFIX}{CACHE_LAYOUT_VERSION}"))
}

fn parse_layout_version(name: &str) -> Option<u32> {
    let version = name.strip_prefix(CACHE_LAYOUT_PREFIX)?;
    if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    version.parse().ok()
}

fn tombstone_dir_name(name: &str) -> String {
    format!(
        "{CACHE_TOMBSTONE_PREFIX}{name}-{}",
        uuid::Uuid::new_v4()
    )
}

/// Creates the directory for the current on-disk layout and tombstones any
/// directory left by an older layout. Returns the active directory and the
/// directories to remove in the background.
pub(super) async fn prepare_layout_dir(root: &Path) -> Result<(PathBuf, Vec<PathBuf>)> {
    async_fs::create_dir_all(root)
        .await
        .with_context(|| format!("failed to create cache root {}", root.display()))?;

    let active_dir = layout_dir(root);
    let active_name = active_dir
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    async_fs::create_dir_all(&active_dir)
        .await
        .with_context(|| format!("failed to create cache dir {}", active_dir.display()))?;

    let mut cleanup_dirs = Vec::new();
    let mut entries = async_fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if name_str == active_name {
            continue;
        }
        if name_str.starts_with(CACHE_TOMBSTONE_PREFIX) {
            cleanup_dirs.push(entry.path());
            continue;
        }
        if parse_layout_version(&name_str).is_some() {
            match tombstone(root, &entry.path()).await {
                Ok(path) => cleanup_dirs.push(path),
                Err(err) => warn!(
                    error = %err,
                    path = %entry.path().display(),
                    "failed to tombstone old cache layout dir"
                ),
            }
        }
    }

    Ok((active_dir, cleanup_dirs))
}

/// Renames `dir` out of the way so it disappears from the active layout in one
/// step; the contents are removed later.
pub(super) async fn tombstone(root: &Path, dir: &Path) -> Result<PathBuf> {
    let name = dir
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let tombstone_path = root.join(tombstone_dir_name(&name));
    async_fs::rename(dir, &tombstone_path)
        .await
        .with_context(|| format!("failed to tombstone {}", dir.display()))?;
    Ok(tombstone_path)
}

pub(super) fn spawn_dir_cleanup(dirs: Vec<PathBuf>) {
    for dir in dirs {
        tokio::spawn(async move {
            match async_fs::remove_dir_all(&dir).await {
                Ok(()) => crate::metrics::record_cache_cleanup_dir(),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(
                        error = %err,
                        path = %dir.display(),
                        "failed to remove old cache dir"
                    );
                }
            }
        });
    }
}
