//! HTTP/1.1 front door. Each connection carries one request, which is handed to
//! the worker as an intercepted fetch.

mod codec;
mod control;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use http::header::{self, HeaderValue};
use http::{Method, StatusCode, Uri};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::logging::AccessLogBuilder;
use crate::router::{Request, RequestMode, ResponseSource, Response, RouteOutcome};
use crate::settings::Settings;
use crate::worker::ServiceWorker;

use codec::{read_body, read_request_head, write_response};

#[derive(Debug, Clone, Copy)]
pub struct ServerLimits {
    pub client_timeout: Duration,
    pub max_header_size: usize,
    pub max_request_body_size: usize,
}

impl ServerLimits {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            client_timeout: settings.client_timeout(),
            max_header_size: settings.max_header_size,
            max_request_body_size: settings.max_request_body_size,
        }
    }
}

#[derive(Clone)]
pub struct AppContext {
    pub worker: Arc<ServiceWorker>,
    pub limits: ServerLimits,
    pub control_prefix: Arc<str>,
}

impl AppContext {
    pub fn new(worker: Arc<ServiceWorker>, limits: ServerLimits, control_prefix: &str) -> Self {
        Self {
            worker,
            limits,
            control_prefix: Arc::from(control_prefix.trim_end_matches('/')),
        }
    }
}

pub async fn start_listener(bind_addr: SocketAddr, app: AppContext) -> Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", bind_addr))?;
    serve(listener, app).await
}

pub async fn serve(listener: TcpListener, app: AppContext) -> Result<()> {
    let local_addr = listener.local_addr().context("listener has no local address")?;
    info!(
        address = %local_addr,
        cache = %app.worker.router().config().cache_name,
        state = app.worker.state().as_str(),
        "router listener started"
    );

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                error!(error = %err, "failed to accept incoming connection");
                continue;
            }
        };
        debug!(peer = %peer_addr, "accepted connection");
        if let Err(err) = stream.set_nodelay(true) {
            debug!(peer = %peer_addr, error = %err, "failed to set TCP_NODELAY on downstream stream");
        }
        let connection_app = app.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, peer_addr, connection_app).await {
                debug!(peer = %peer_addr, error = %err, "connection closed with error");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, app: AppContext) -> Result<()> {
    let started = Instant::now();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let limits = app.limits;

    let head = match read_request_head(
        &mut reader,
        peer,
        limits.client_timeout,
        limits.max_header_size,
    )
    .await
    {
        Ok(Some(head)) => head,
        Ok(None) => return Ok(()),
        Err(err) => {
            let response = Response::empty(StatusCode::BAD_REQUEST);
            let sent = write_response(&mut write_half, &response, true)
                .await
                .unwrap_or(0);
            AccessLogBuilder::new(peer)
                .class("invalid")
                .status(response.status)
                .bytes(0, sent)
                .elapsed(started.elapsed())
                .error_reason(err.to_string())
                .log();
            return Err(err);
        }
    };

    let method = head.method.clone();
    let log = AccessLogBuilder::new(peer).request_line(method.as_str(), head.target.clone());
    let include_body = method != Method::HEAD;

    if head.content_length > limits.max_request_body_size {
        let response = Response::empty(StatusCode::PAYLOAD_TOO_LARGE);
        let sent = write_response(&mut write_half, &response, include_body).await?;
        log.class("invalid")
            .status(response.status)
            .bytes(head.head_bytes as u64, sent)
            .elapsed(started.elapsed())
            .error_reason("request body too large")
            .log();
        return Ok(());
    }

    let uri = match head.target.parse::<Uri>() {
        Ok(uri) => uri,
        Err(err) => {
            let response = Response::empty(StatusCode::BAD_REQUEST);
            let sent = write_response(&mut write_half, &response, include_body).await?;
            log.class("invalid")
                .status(response.status)
                .bytes(head.head_bytes as u64, sent)
                .elapsed(started.elapsed())
                .error_reason(format!("invalid request target: {err}"))
                .log();
            return Ok(());
        }
    };

    let body = read_body(
        &mut reader,
        head.content_length,
        limits.max_request_body_size,
        limits.client_timeout,
    )
    .await?;
    let bytes_in = (head.head_bytes + body.len()) as u64;

    if control::is_control_path(uri.path(), &app.control_prefix) {
        let response = control::handle(&app, &method, uri.path(), body).await;
        let sent = write_response(&mut write_half, &response, include_body).await?;
        log.class("control")
            .status(response.status)
            .bytes(bytes_in, sent)
            .elapsed(started.elapsed())
            .log();
        return Ok(());
    }

    let request = Request::from_fetch_metadata(method, uri, head.headers, body);
    if request.mode == RequestMode::Navigate {
        app.worker.observe_navigation(request.path());
    }
    let routed = app.worker.fetch(&request).await;
    let mut log = log
        .fetch_metadata(request.mode, request.destination)
        .route(&routed.report);
    let mut error_reason = None;

    let response = match routed.outcome {
        RouteOutcome::Respond(response) => response,
        RouteOutcome::NetworkError => {
            error_reason = Some("network unavailable and nothing cached".to_string());
            bad_gateway()
        }
        RouteOutcome::Passthrough => match app.worker.router().fetcher().fetch(&request).await {
            Ok(response) => {
                log = log.cache_source(ResponseSource::Network.as_str());
                response
            }
            Err(err) => {
                error_reason = Some(err.to_string());
                bad_gateway()
            }
        },
    };

    let sent = write_response(&mut write_half, &response, include_body).await?;
    log = log
        .status(response.status)
        .bytes(bytes_in, sent)
        .elapsed(started.elapsed());
    if let Some(reason) = error_reason {
        log = log.error_reason(reason);
    }
    log.log();
    Ok(())
}

fn bad_gateway() -> Response {
    Response::empty(StatusCode::BAD_GATEWAY).with_header(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    )
}
