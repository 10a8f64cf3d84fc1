//! Axum wiring for the request pipeline. Deliberately avoids `Path<>`
//! extraction — axum's path extractor percent-decodes segments itself,
//! which would undo `parse::parse_command_path`'s own (asymmetric,
//! argv[0]-preserving) decoding. The raw `Uri` is read straight off the
//! request instead.

use crate::pipeline::{self, Gateway, RequestContext};
use axum::body::to_bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

pub async fn handle(
    State(state): State<Arc<Gateway>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    let method = req.method().clone();
    let version = req.version();
    let headers = req.headers().clone();
    let raw_target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let body = match to_bytes(req.into_body(), state.max_body_bytes).await {
        Ok(bytes) => bytes.to_vec(),
        Err(_) => {
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        }
    };

    let ctx = RequestContext {
        method,
        version,
        raw_target,
        body,
        peer_ip: addr.ip(),
        authorization: header_string(&headers, "authorization"),
        if_none_match: header_string(&headers, "if-none-match"),
        connection_header: header_string(&headers, "connection"),
    };

    let outcome = pipeline::run(&state, &ctx).await;
    let response = pipeline::to_response(outcome, &ctx);
    debug!(
        method = %ctx.method,
        path = %ctx.raw_target,
        status = %response.status(),
        "request handled"
    );
    response
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// CORS preflight. No ACL check applies here — it never reaches Redis.
pub async fn handle_options() -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Server", HeaderValue::from_static("Webdis"));
    headers.insert(
        "Access-Control-Allow-Origin",
        HeaderValue::from_static("*"),
    );
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, PUT, OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("*"),
    );
    headers.insert("Allow", HeaderValue::from_static("GET,POST,OPTIONS"));
    (StatusCode::OK, headers).into_response()
}
