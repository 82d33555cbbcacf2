use crate::api::middleware::request_id::REQUEST_ID_HEADER;
use axum::{
    extract::Request,
    http::{HeaderMap, Method, header},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::info;

/// Which part of the service a request hit
fn route_kind(method: &Method, path: &str) -> &'static str {
    match (method, path) {
        (&Method::POST, "/") => "upload",
        (&Method::GET, "/") => "upload_form",
        (&Method::POST, p) if p.starts_with("/password/") => "retrieve",
        (&Method::GET, p) if p.starts_with("/password/") => "password_form",
        (_, "/health") => "health",
        _ => "other",
    }
}

fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Logs one line per request under target `metrics`. File names in the
/// path are not logged.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let route = route_kind(req.method(), req.uri().path());
    let bytes_in = content_length(req.headers());
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let response = next.run(req).await;

    info!(
        target: "metrics",
        route,
        request_id = %request_id,
        status = response.status().as_u16(),
        bytes_in,
        bytes_out = content_length(response.headers()),
        latency_ms = start.elapsed().as_millis() as u64,
        "request_completed"
    );

    response
}
