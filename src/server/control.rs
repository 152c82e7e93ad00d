//! Control endpoints under the configured prefix. They stand in for the page
//! side of the worker: posting messages, firing sync tags, delivering pushes
//! and notification clicks.

use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use serde::Serialize;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use super::AppContext;
use crate::router::Response;
use crate::worker::{ClickOutcome, WindowAction, WorkerMessage};

pub(super) fn is_control_path(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

pub(super) async fn handle(app: &AppContext, method: &Method, path: &str, body: Bytes) -> Response {
    let rest = path
        .strip_prefix(app.control_prefix.as_ref())
        .unwrap_or_default()
        .trim_start_matches('/');
    let (endpoint, arg) = match rest.split_once('/') {
        Some((endpoint, arg)) => (endpoint, Some(arg)),
        None => (rest, None),
    };

    let response = match (method, endpoint, arg) {
        (&Method::POST, "message", None) => post_message(app, &body).await,
        (&Method::GET, "metrics", None) => metrics(),
        (&Method::GET, "state", None) => state(app),
        (&Method::POST, "sync", Some(tag)) => run_sync(app, tag).await,
        (&Method::POST, "queue", Some(tag)) => enqueue(app, tag, &body).await,
        (&Method::POST, "push", None) => push(app, &body),
        (&Method::POST, "notification-click", None) => notification_click(app, &body),
        (_, "message" | "metrics" | "state" | "sync" | "queue" | "push" | "notification-click", _) => {
            Response::empty(StatusCode::METHOD_NOT_ALLOWED)
        }
        _ => Response::not_found(),
    };
    crate::metrics::record_control(known_endpoint(endpoint));
    response
}

fn known_endpoint(endpoint: &str) -> &'static str {
    match endpoint {
        "message" => "message",
        "metrics" => "metrics",
        "state" => "state",
        "sync" => "sync",
        "queue" => "queue",
        "push" => "push",
        "notification-click" => "notification_click",
        _ => "unknown",
    }
}

async fn post_message(app: &AppContext, body: &[u8]) -> Response {
    let message: WorkerMessage = match serde_json::from_slice(body) {
        Ok(message) => message,
        Err(err) => {
            debug!(error = %err, "rejecting malformed worker message");
            return error_json(StatusCode::BAD_REQUEST, format!("invalid message: {err}"));
        }
    };

    match message {
        WorkerMessage::GetVersion => {
            let (port, reply) = oneshot::channel();
            if let Err(err) = app.worker.handle_message(message, Some(port)).await {
                return error_json(StatusCode::CONFLICT, err.to_string());
            }
            match reply.await {
                Ok(version) => json_response(StatusCode::OK, &version),
                Err(_) => error_json(StatusCode::INTERNAL_SERVER_ERROR, "no version reply"),
            }
        }
        WorkerMessage::SkipWaiting => match app.worker.handle_message(message, None).await {
            Ok(()) => json_response(
                StatusCode::ACCEPTED,
                &json!({ "state": app.worker.state().as_str() }),
            ),
            Err(err) => error_json(StatusCode::CONFLICT, err.to_string()),
        },
    }
}

fn metrics() -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&crate::metrics::content_type()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    Response::new(StatusCode::OK, headers, crate::metrics::gather())
}

fn state(app: &AppContext) -> Response {
    let config = app.worker.router().config();
    json_response(
        StatusCode::OK,
        &json!({
            "state": app.worker.state().as_str(),
            "cache_name": config.cache_name.as_ref(),
            "partitions": app.worker.router().storage().keys(),
            "clients": app.worker.clients().match_all(),
        }),
    )
}

async fn run_sync(app: &AppContext, tag: &str) -> Response {
    match app.worker.sync(tag).await {
        Ok(report) => json_response(StatusCode::OK, &report),
        Err(err) => {
            warn!(tag, error = %err, "sync failed");
            error_json(StatusCode::SERVICE_UNAVAILABLE, format!("{err:#}"))
        }
    }
}

async fn enqueue(app: &AppContext, tag: &str, body: &[u8]) -> Response {
    let payload: serde_json::Value = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(err) => return error_json(StatusCode::BAD_REQUEST, format!("invalid payload: {err}")),
    };
    match app.worker.sync_manager().queue().push(tag, payload).await {
        Ok(item) => json_response(StatusCode::ACCEPTED, &item),
        Err(err) => {
            warn!(tag, error = %err, "failed to queue item");
            error_json(StatusCode::BAD_REQUEST, format!("{err:#}"))
        }
    }
}

fn push(app: &AppContext, body: &[u8]) -> Response {
    let payload = std::str::from_utf8(body).ok();
    json_response(StatusCode::OK, &app.worker.push(payload))
}

fn notification_click(app: &AppContext, body: &[u8]) -> Response {
    let action = std::str::from_utf8(body)
        .ok()
        .map(str::trim)
        .filter(|action| !action.is_empty());
    let outcome = match app.worker.notification_click(action) {
        ClickOutcome::Dismissed => json!({ "outcome": "dismissed" }),
        ClickOutcome::Window(WindowAction::Focused(id)) => {
            json!({ "outcome": "focused", "client": id })
        }
        ClickOutcome::Window(WindowAction::Opened(id)) => {
            json!({ "outcome": "opened", "client": id })
        }
    };
    json_response(StatusCode::OK, &outcome)
}

fn error_json(status: StatusCode, message: impl Into<String>) -> Response {
    json_response(status, &json!({ "error": message.into() }))
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => Response::new(status, HeaderMap::new(), body).with_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ),
        Err(err) => {
            error!(error = %err, "failed to encode control response");
            Response::empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
