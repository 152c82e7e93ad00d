use std::sync::Arc;

pub const DEFAULT_IMAGE_CAP: usize = 100;
pub const DEFAULT_OFFLINE_DOCUMENT: &str = "/offline.html";
pub const DEFAULT_OFFLINE_IMAGE: &str = "/images/offline.svg";

/// Assets every install must pre-cache.
pub const DEFAULT_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/productos.html",
    "/contacto.html",
    "/nosotros.html",
    "/css/styles.css",
    "/js/main.js",
    "/js/components.js",
    "/js/breadcrumbs.js",
    "/js/language.js",
    "/data/products.json",
    "/manifest.json",
    "/favicon.ico",
    "https://fonts.googleapis.com/css2?family=Noto+Sans+JP:wght@400;700&family=Poppins:wght@400;600&display=swap",
    "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css",
];

/// Everything one router instance needs to know about its deployment.
///
/// Partition names embed the version, so bumping the version is what retires
/// the previous generation's partitions at activation.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub version: Arc<str>,
    pub prefix: Option<Arc<str>>,
    pub cache_name: Arc<str>,
    pub static_cache_name: Arc<str>,
    pub dynamic_cache_name: Arc<str>,
    pub manifest: Arc<[Arc<str>]>,
    pub max_dynamic_image_entries: usize,
    pub offline_document: Arc<str>,
    pub offline_image: Arc<str>,
}
