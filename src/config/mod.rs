pub mod model;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Result, bail, ensure};

pub use model::{
    DEFAULT_IMAGE_CAP, DEFAULT_MANIFEST, DEFAULT_OFFLINE_DOCUMENT, DEFAULT_OFFLINE_IMAGE,
    RouterConfig,
};

/// Checks that every manifest URL is either origin-relative or absolute http(s)
/// and that no URL is listed twice.
pub fn validate_manifest(manifest: &[Arc<str>]) -> Result<()> {
    let mut seen = HashSet::new();
    for url in manifest {
        let url = url.as_ref();
        ensure!(!url.is_empty(), "manifest entries must not be empty");
        if !(url.starts_with('/') || url.starts_with("http://") || url.starts_with("https://")) {
            bail!("manifest entry '{url}' must be an absolute path or an http(s) URL");
        }
        ensure!(
            !url.contains('#'),
            "manifest entry '{url}' must not carry a fragment"
        );
        if !seen.insert(url) {
            bail!("manifest entry '{url}' is listed more than once");
        }
    }
    Ok(())
}

impl RouterConfig {
    /// Configuration for `version` with the default manifest, fallbacks and
    /// image cap: partitions `static-<version>` and `dynamic-<version>`.
    pub fn for_version(version: &str) -> Self {
        let mut config = Self {
            version: Arc::from(version),
            prefix: None,
            cache_name: Arc::from(""),
            static_cache_name: Arc::from(""),
            dynamic_cache_name: Arc::from(""),
            manifest: DEFAULT_MANIFEST.iter().map(|url| Arc::from(*url)).collect(),
            max_dynamic_image_entries: DEFAULT_IMAGE_CAP,
            offline_document: Arc::from(DEFAULT_OFFLINE_DOCUMENT),
            offline_image: Arc::from(DEFAULT_OFFLINE_IMAGE),
        };
        config.rename_partitions();
        config
    }

    /// Prefixes every partition name, e.g. `tienda-static-v1`, and makes the
    /// combined cache name `tienda-v1`.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = if prefix.is_empty() {
            None
        } else {
            Some(Arc::from(prefix))
        };
        self.rename_partitions();
        self
    }

    pub fn with_manifest<I, S>(mut self, manifest: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.manifest = manifest
            .into_iter()
            .map(|url| Arc::from(url.as_ref()))
            .collect();
        self
    }

    pub fn with_image_cap(mut self, cap: usize) -> Self {
        self.max_dynamic_image_entries = cap;
        self
    }

    pub fn with_offline_document(mut self, path: &str) -> Self {
        self.offline_document = Arc::from(path);
        self
    }

    pub fn with_offline_image(mut self, path: &str) -> Self {
        self.offline_image = Arc::from(path);
        self
    }

    fn rename_partitions(&mut self) {
        let version = &self.version;
        match &self.prefix {
            Some(prefix) => {
                self.cache_name = Arc::from(format!("{prefix}-{version}"));
                self.static_cache_name = Arc::from(format!("{prefix}-static-{version}"));
                self.dynamic_cache_name = Arc::from(format!("{prefix}-dynamic-{version}"));
            }
            None => {
                self.cache_name = version.clone();
                self.static_cache_name = Arc::from(format!("static-{version}"));
                self.dynamic_cache_name = Arc::from(format!("dynamic-{version}"));
            }
        }
    }

    /// Whether `name` is one of the two partitions this version owns.
    pub fn is_current_partition(&self, name: &str) -> bool {
        name == self.static_cache_name.as_ref() || name == self.dynamic_cache_name.as_ref()
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.version.trim().is_empty(), "version must not be empty");
        ensure!(
            self.max_dynamic_image_entries > 0,
            "max_dynamic_image_entries must be greater than zero"
        );
        ensure!(
            self.offline_document.starts_with('/'),
            "offline_document must be an absolute path"
        );
        ensure!(
            self.offline_image.starts_with('/'),
            "offline_image must be an absolute path"
        );
        validate_manifest(&self.manifest)
    }
}
