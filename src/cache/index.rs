use std::collections::{BTreeMap, HashMap};

use super::CacheEntry;

/// In-memory view of one partition, ordered by insertion sequence.
///
/// Reads never reorder entries: eviction is FIFO, not LRU.
#[derive(Debug)]
pub(super) struct PartitionIndex {
    created_seq: u64,
    by_url: HashMap<String, CacheEntry>,
    order: BTreeMap<u64, String>,
}

impl PartitionIndex {
    pub(super) fn new(created_seq: u64) -> Self {
        Self {
            created_seq,
            by_url: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    pub(super) fn created_seq(&self) -> u64 {
        self.created_seq
    }

    pub(super) fn get(&self, url: &str) -> Option<&CacheEntry> {
        self.by_url.get(url)
    }

    /// Inserts `entry`, returning the entry it replaced. A replaced URL moves
    /// to the newest position.
    pub(super) fn insert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        let replaced = self.remove(&entry.url);
        self.order.insert(entry.seq, entry.url.clone());
        self.by_url.insert(entry.url.clone(), entry);
        replaced
    }

    pub(super) fn remove(&mut self, url: &str) -> Option<CacheEntry> {
        let removed = self.by_url.remove(url)?;
        self.order.remove(&removed.seq);
        Some(removed)
    }

    pub(super) fn oldest_url(&self) -> Option<&str> {
        self.order.values().next().map(String::as_str)
    }

    pub(super) fn urls(&self) -> Vec<String> {
        self.order.values().cloned().collect()
    }

    pub(super) fn len(&self) -> usize {
        self.by_url.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Response;

    fn entry(seq: u64, url: &str) -> CacheEntry {
        CacheEntry::new(
            seq,
            super::super::CacheKey::entry_id_for(url),
            url.to_string(),
            Response::ok(url.to_string()),
        )
    }

    #[test]
    fn keeps_insertion_order() {
        let mut index = PartitionIndex::new(0);
        index.insert(entry(3, "/c"));
        index.insert(entry(1, "/a"));
        index.insert(entry(2, "/b"));
        assert_eq!(index.urls(), vec!["/a", "/b", "/c"]);
        assert_eq!(index.oldest_url(), Some("/a"));
    }

    #[test]
    fn reinsert_moves_to_newest() {
        let mut index = PartitionIndex::new(0);
        index.insert(entry(1, "/a"));
        index.insert(entry(2, "/b"));
        let replaced = index.insert(entry(3, "/a"));
        assert_eq!(replaced.map(|e| e.seq), Some(1));
        assert_eq!(index.urls(), vec!["/b", "/a"]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn reads_do_not_reorder() {
        let mut index = PartitionIndex::new(0);
        index.insert(entry(1, "/a"));
        index.insert(entry(2, "/b"));
        assert!(index.get("/a").is_some());
        assert_eq!(index.oldest_url(), Some("/a"));
    }
}
