use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};

use crate::router::Response;

#[derive(Debug, Clone)]
pub(super) struct CacheEntry {
    pub seq: u64,
    pub entry_id: String,
    pub url: String,
    pub response: Response,
    pub content_hash: String,
}

impl CacheEntry {
    pub(super) fn new(seq: u64, entry_id: String, url: String, response: Response) -> Self {
        let content_hash = blake3::hash(&response.body).to_hex().to_string();
        Self {
            seq,
            entry_id,
            url,
            response,
            content_hash,
        }
    }

    pub(super) fn to_persisted(&self) -> PersistedEntry {
        PersistedEntry {
            url: self.url.clone(),
            seq: self.seq,
            status: self.response.status.as_u16(),
            headers: headermap_to_vec(&self.response.headers),
            content_hash: self.content_hash.clone(),
            content_length: self.response.content_length(),
        }
    }

    pub(super) fn from_persisted(
        persisted: PersistedEntry,
        entry_id: String,
        body: Vec<u8>,
    ) -> Self {
        let response = Response::new(
            StatusCode::from_u16(persisted.status).unwrap_or(StatusCode::OK),
            to_headermap(&persisted.headers),
            body,
        );
        Self {
            seq: persisted.seq,
            entry_id,
            url: persisted.url,
            response,
            content_hash: persisted.content_hash,
        }
    }
}

/// Sidecar metadata written next to each body file.
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct PersistedEntry {
    pub url: String,
    pub seq: u64,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content_hash: String,
    pub content_length: u64,
}

/// `partition.json` at the root of each partition directory.
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct PartitionDescriptor {
    pub name: String,
    pub created_seq: u64,
}

pub(super) fn to_headermap(items: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in items {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::try_from(name.as_str()),
            http::HeaderValue::from_str(value),
        ) {
            map.append(name, value);
        }
    }
    map
}

fn headermap_to_vec(map: &HeaderMap) -> Vec<(String, String)> {
    let mut items = Vec::new();
    for (name, value) in map.iter() {
        if let Ok(value_str) = value.to_str() {
            items.push((name.as_str().to_string(), value_str.to_string()));
        }
    }
    items
}
