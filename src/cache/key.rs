use crate::router::Request;

#[derive(Debug, Clone)]
pub(super) struct CacheKey {
    url: String,
    entry_id: String,
}

impl CacheKey {
    pub(super) fn for_request(request: &Request) -> Self {
        Self::from_url(request.url())
    }

    pub(super) fn from_url(url: String) -> Self {
        let entry_id = Self::entry_id_for(&url);
        Self { url, entry_id }
    }

    pub(super) fn url(&self) -> &str {
        &self.url
    }

    pub(super) fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub(super) fn entry_id_for(url: &str) -> String {
        blake3::hash(url.as_bytes()).to_hex().to_string()
    }
}

/// Directory name for a partition; partition names are free-form strings.
pub(super) fn partition_dir_name(name: &str) -> String {
    let hash = blake3::hash(name.as_bytes()).to_hex().to_string();
    format!("p-{}", &hash[..32])
}
