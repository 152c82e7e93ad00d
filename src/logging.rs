use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Result, anyhow};
use http::StatusCode;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogFormat;
use crate::router::{RequestDestination, RequestMode, RouteReport};

const DEFAULT_FILTER: &str = "info";

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logger(format: LogFormat) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = fmt::fmt().with_env_filter(filter);

    let installed = match format {
        LogFormat::Json => builder
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .try_init(),
        LogFormat::Text => builder.with_target(false).compact().try_init(),
    };
    installed.map_err(|err| anyhow!(err))
}

/// One line per exchange on the listener.
#[derive(Debug, Clone)]
pub struct AccessLogEvent {
    pub peer: SocketAddr,
    pub method: String,
    pub path: String,
    pub mode: Option<&'static str>,
    pub destination: Option<&'static str>,
    /// `control` and `invalid` for requests that never reach the router.
    pub class: &'static str,
    pub cache_source: Option<&'static str>,
    pub cache_store: Option<&'static str>,
    pub status: u16,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub elapsed: Duration,
    pub error_reason: Option<String>,
}

#[derive(Debug)]
pub struct AccessLogBuilder {
    event: AccessLogEvent,
}

impl AccessLogBuilder {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            event: AccessLogEvent {
                peer,
                method: String::new(),
                path: String::new(),
                mode: None,
                destination: None,
                class: "unknown",
                cache_source: None,
                cache_store: None,
                status: 0,
                bytes_in: 0,
                bytes_out: 0,
                elapsed: Duration::ZERO,
                error_reason: None,
            },
        }
    }

    pub fn request_line(mut self, method: &str, path: impl Into<String>) -> Self {
        self.event.method = method.to_string();
        self.event.path = path.into();
        self
    }

    pub fn fetch_metadata(mut self, mode: RequestMode, destination: RequestDestination) -> Self {
        self.event.mode = Some(mode.as_str());
        let destination = destination.as_str();
        self.event.destination = (!destination.is_empty()).then_some(destination);
        self
    }

    pub fn class(mut self, class: &'static str) -> Self {
        self.event.class = class;
        self
    }

    /// Copies the router's class, response source and write-back outcome.
    pub fn route(mut self, report: &RouteReport) -> Self {
        self.event.class = report.class.as_str();
        self.event.cache_source = Some(report.source.as_str());
        self.event.cache_store = Some(report.stored.as_str());
        self
    }

    /// Overrides the response source after the router passed a request through.
    pub fn cache_source(mut self, source: &'static str) -> Self {
        self.event.cache_source = Some(source);
        self
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.event.status = status.as_u16();
        self
    }

    pub fn bytes(mut self, in_bytes: u64, out_bytes: u64) -> Self {
        self.event.bytes_in = in_bytes;
        self.event.bytes_out = out_bytes;
        self
    }

    pub fn elapsed(mut self, elapsed: Duration) -> Self {
        self.event.elapsed = elapsed;
        self
    }

    pub fn error_reason(mut self, reason: impl Into<String>) -> Self {
        self.event.error_reason = Some(reason.into());
        self
    }

    pub fn build(self) -> AccessLogEvent {
        self.event
    }

    pub fn log(self) {
        log_access(self.build());
    }
}

pub fn log_access(event: AccessLogEvent) {
    let ts = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    let elapsed_ms = event.elapsed.as_millis() as u64;

    tracing::info!(
        target: "access_log",
        ts,
        client_ip = %event.peer.ip(),
        client_port = event.peer.port(),
        method = event.method.as_str(),
        path = event.path.as_str(),
        mode = event.mode,
        destination = event.destination,
        class = event.class,
        cache_source = event.cache_source,
        cache_store = event.cache_store,
        status = event.status,
        bytes_in = event.bytes_in,
        bytes_out = event.bytes_out,
        elapsed_ms,
        error_reason = event.error_reason.as_deref()
    );

    crate::metrics::record_request(
        &event.method,
        event.class,
        StatusCode::from_u16(event.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        event.elapsed,
    );
}
