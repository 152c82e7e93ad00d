use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail, ensure};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::cli::{Cli, LogFormat};
use crate::config::{
    DEFAULT_IMAGE_CAP, DEFAULT_OFFLINE_DOCUMENT, DEFAULT_OFFLINE_IMAGE, RouterConfig,
};
use crate::sync::SyncEndpoints;

const ENV_PREFIX: &str = "OFFLINE_ROUTER";

fn default_offline_document() -> String {
    DEFAULT_OFFLINE_DOCUMENT.to_string()
}

fn default_offline_image() -> String {
    DEFAULT_OFFLINE_IMAGE.to_string()
}

fn default_max_dynamic_image_entries() -> usize {
    DEFAULT_IMAGE_CAP
}

fn default_control_prefix() -> String {
    "/__router".to_string()
}

fn default_cart_sync_endpoint() -> String {
    "/api/cart/sync".to_string()
}

fn default_contact_sync_endpoint() -> String {
    "/api/contact".to_string()
}

fn default_client_timeout() -> u64 {
    30
}

fn default_upstream_timeout() -> u64 {
    30
}

fn default_max_header_size() -> usize {
    32 * 1024
}

fn default_max_request_body_size() -> usize {
    1024 * 1024
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub listen: SocketAddr,
    /// Base URL origin-relative requests are fetched from.
    pub origin: String,
    pub version: String,
    #[serde(default)]
    pub cache_prefix: Option<String>,
    /// Persist partitions here; in memory when unset.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Replaces the built-in static manifest when set.
    #[serde(default)]
    pub manifest: Option<Vec<String>>,
    #[serde(default = "default_offline_document")]
    pub offline_document: String,
    #[serde(default = "default_offline_image")]
    pub offline_image: String,
    #[serde(default = "default_max_dynamic_image_entries")]
    pub max_dynamic_image_entries: usize,
    #[serde(default = "default_control_prefix")]
    pub control_prefix: String,
    /// Durable sync queues live here; in memory when unset.
    #[serde(default)]
    pub sync_queue_dir: Option<PathBuf>,
    #[serde(default = "default_cart_sync_endpoint")]
    pub cart_sync_endpoint: String,
    #[serde(default = "default_contact_sync_endpoint")]
    pub contact_sync_endpoint: String,
    #[serde(default = "default_log_format")]
    pub log: LogFormat,
    #[serde(default = "default_client_timeout")]
    pub client_timeout: u64,
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout: u64,
    #[serde(default = "default_max_header_size")]
    pub max_header_size: usize,
    #[serde(default = "default_max_request_body_size")]
    pub max_request_body_size: usize,
}

impl Settings {
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path = resolve_config_path(cli)?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let cfg = Config::builder()
            .add_source(File::from(config_path.to_path_buf()).required(true))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(to_anyhow)?;
        let mut settings: Settings = cfg.try_deserialize().map_err(to_anyhow)?;
        settings.apply_base_dir(config_path);
        settings.validate()?;
        Ok(settings)
    }

    /// The router configuration these settings describe, validated.
    pub fn router_config(&self) -> Result<RouterConfig> {
        let mut config = RouterConfig::for_version(&self.version)
            .with_image_cap(self.max_dynamic_image_entries)
            .with_offline_document(&self.offline_document)
            .with_offline_image(&self.offline_image);
        if let Some(prefix) = &self.cache_prefix {
            config = config.with_prefix(prefix);
        }
        if let Some(manifest) = &self.manifest {
            config = config.with_manifest(manifest);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn sync_endpoints(&self) -> SyncEndpoints {
        SyncEndpoints {
            cart: self.cart_sync_endpoint.clone(),
            contact: self.contact_sync_endpoint.clone(),
        }
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout)
    }
}

fn to_anyhow(err: ConfigError) -> anyhow::Error {
    anyhow::anyhow!(err)
}

impl Cli {
    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

fn resolve_config_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(path) = cli.config_path() {
        return Ok(path.to_path_buf());
    }

    for candidate in default_config_candidates() {
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    bail!(
        "no configuration file provided via --config and none found in default locations: {}",
        default_config_candidates()
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
}

fn default_config_candidates() -> [PathBuf; 2] {
    [
        PathBuf::from("/etc/offline-router/offline-router.toml"),
        PathBuf::from("offline-router.toml"),
    ]
}

impl Settings {
    fn apply_base_dir(&mut self, config_path: &Path) {
        let base_dir = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        if let Some(cache_dir) = self.cache_dir.clone() {
            self.cache_dir = Some(absolutize(&cache_dir, base_dir));
        }
        if let Some(queue_dir) = self.sync_queue_dir.clone() {
            self.sync_queue_dir = Some(absolutize(&queue_dir, base_dir));
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.version.trim().is_empty(),
            "version must not be empty"
        );
        ensure!(
            self.origin.starts_with("http://") || self.origin.starts_with("https://"),
            "origin must be an http(s) URL (got '{}')",
            self.origin
        );
        ensure!(
            self.control_prefix.starts_with('/') && self.control_prefix.len() > 1,
            "control_prefix must start with '/' and name a path (got '{}')",
            self.control_prefix
        );
        ensure!(
            self.max_dynamic_image_entries > 0,
            "max_dynamic_image_entries must be greater than 0 (got {})",
            self.max_dynamic_image_entries
        );
        ensure!(
            self.max_header_size > 0,
            "max_header_size must be greater than 0 (got {})",
            self.max_header_size
        );
        ensure!(
            self.max_request_body_size > 0,
            "max_request_body_size must be greater than 0 (got {})",
            self.max_request_body_size
        );
        ensure!(
            self.client_timeout > 0,
            "client_timeout must be greater than 0 seconds (got {})",
            self.client_timeout
        );
        ensure!(
            self.upstream_timeout > 0,
            "upstream_timeout must be greater than 0 seconds (got {})",
            self.upstream_timeout
        );
        Ok(())
    }
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
