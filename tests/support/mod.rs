#![allow(dead_code)]

pub mod logging;
pub mod upstream;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use offline_router::{
    build_worker,
    cli::LogFormat,
    server::{self, AppContext, ServerLimits},
    settings::Settings,
    worker::ServiceWorker,
};

pub use logging::LogCapture;
pub use upstream::{ReceivedRequest, SiteUpstream};

pub const SITE_MANIFEST: [&str; 5] = [
    "/",
    "/index.html",
    "/offline.html",
    "/css/styles.css",
    "/js/app.js",
];

pub const OFFLINE_PAGE: &str = "<html><body>Sin conexi\u{f3}n</body></html>";

/// Serves every manifest URL from `upstream`.
pub fn serve_site(upstream: &SiteUpstream) {
    upstream.ok("/", "text/html", "<html><body>Inicio</body></html>");
    upstream.ok("/index.html", "text/html", "<html><body>Inicio</body></html>");
    upstream.ok("/offline.html", "text/html", OFFLINE_PAGE);
    upstream.ok("/css/styles.css", "text/css", "body { margin: 0 }");
    upstream.ok("/js/app.js", "application/javascript", "console.log('tienda')");
}

pub struct TestDirs {
    _temp: TempDir,
    pub root: PathBuf,
    pub cache_dir: PathBuf,
    pub queue_dir: PathBuf,
}

impl TestDirs {
    pub fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let root = temp.path().to_path_buf();
        let cache_dir = root.join("cache");
        let queue_dir = root.join("queue");
        Ok(Self {
            _temp: temp,
            root,
            cache_dir,
            queue_dir,
        })
    }
}

pub fn test_settings(origin: &str, version: &str, dirs: Option<&TestDirs>) -> Settings {
    Settings {
        listen: "127.0.0.1:0".parse().expect("valid listen address"),
        origin: origin.to_string(),
        version: version.to_string(),
        cache_prefix: None,
        cache_dir: dirs.map(|dirs| dirs.cache_dir.clone()),
        manifest: Some(SITE_MANIFEST.iter().map(|url| url.to_string()).collect()),
        offline_document: "/offline.html".to_string(),
        offline_image: "/images/offline.svg".to_string(),
        max_dynamic_image_entries: 100,
        control_prefix: "/__router".to_string(),
        sync_queue_dir: dirs.map(|dirs| dirs.queue_dir.clone()),
        cart_sync_endpoint: "/api/cart/sync".to_string(),
        contact_sync_endpoint: "/api/contact".to_string(),
        log: LogFormat::Text,
        client_timeout: 5,
        upstream_timeout: 5,
        max_header_size: 16 * 1024,
        max_request_body_size: 64 * 1024,
    }
}

/// A worker behind a live listener.
pub struct RouterHarness {
    pub addr: SocketAddr,
    pub worker: Arc<ServiceWorker>,
    handle: JoinHandle<Result<()>>,
}

impl RouterHarness {
    /// Builds the worker, installs and activates it, then starts serving.
    pub async fn start(settings: &Settings) -> Result<Self> {
        let worker = Arc::new(build_worker(settings).await?);
        worker
            .install_and_activate()
            .await
            .context("install failed")?;
        let listener = TcpListener::bind(settings.listen).await?;
        let addr = listener.local_addr()?;
        let app = AppContext::new(
            worker.clone(),
            ServerLimits::from_settings(settings),
            &settings.control_prefix,
        );
        let handle = tokio::spawn(server::serve(listener, app));
        Ok(Self {
            addr,
            worker,
            handle,
        })
    }

    pub async fn send(&self, raw: &str) -> Result<HttpReply> {
        send_raw(self.addr, raw).await
    }

    pub async fn get(&self, path: &str, extra_headers: &str) -> Result<HttpReply> {
        self.send(&format!(
            "GET {path} HTTP/1.1\r\nHost: tienda.test\r\n{extra_headers}\r\n"
        ))
        .await
    }

    pub async fn post(&self, path: &str, body: &str) -> Result<HttpReply> {
        self.send(&format!(
            "POST {path} HTTP/1.1\r\nHost: tienda.test\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        ))
        .await
    }
}

impl Drop for RouterHarness {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug)]
pub struct HttpReply {
    pub status: u16,
    pub head: String,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn json(&self) -> Result<serde_json::Value> {
        serde_json::from_slice(&self.body).context("reply body is not JSON")
    }
}

pub async fn send_raw(addr: SocketAddr, raw: &str) -> Result<HttpReply> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(raw.as_bytes()).await?;
    let mut data = Vec::new();
    timeout(StdDuration::from_secs(5), stream.read_to_end(&mut data)).await??;

    let head_end = data
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| anyhow!("response has no header terminator"))?;
    let head = String::from_utf8_lossy(&data[..head_end]).to_string();
    let status = head
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| anyhow!("missing status code in response line"))?
        .parse::<u16>()
        .map_err(|err| anyhow!("invalid status code: {err}"))?;
    Ok(HttpReply {
        status,
        head,
        body: data[head_end + 4..].to_vec(),
    })
}
