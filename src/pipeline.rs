//! Request pipeline (module E): the state machine that turns a parsed
//! request into a `Response` — `Received -> Parsed -> Admitted ->
//! Dispatched -> Replying`. Grounded on `client.c::http_on_complete` for
//! the stage ordering and keep-alive/Connection-header negotiation.

use crate::acl::{self, Acl};
use crate::error::GatewayError;
use crate::format;
use crate::parse;
use crate::pubsub::{self, SubscribeKind};
use crate::reply;
use crate::upstream::Upstream;
use axum::body::Body;
use axum::http::{header, HeaderValue, Method, StatusCode, Version};
use axum::response::{IntoResponse, Response};
use std::net::IpAddr;
use std::sync::Arc;

const CROSSDOMAIN_XML: &[u8] = br#"<?xml version="1.0"?>
<!DOCTYPE cross-domain-policy SYSTEM "http://www.adobe.com/xml/dtds/cross-domain-policy.dtd">
<cross-domain-policy>
  <allow-access-from domain="*" />
</cross-domain-policy>
"#;

pub struct Gateway {
    pub upstream: Arc<Upstream>,
    pub acl: Acl,
    pub max_body_bytes: usize,
}

/// Everything the pipeline needs about one inbound request, gathered once
/// by the axum handler so `run`/`to_response` don't re-derive it.
pub struct RequestContext {
    pub method: Method,
    pub version: Version,
    pub raw_target: String,
    pub body: Vec<u8>,
    pub peer_ip: IpAddr,
    pub authorization: Option<String>,
    pub if_none_match: Option<String>,
    pub connection_header: Option<String>,
}

pub enum Outcome {
    Rendered {
        body: Vec<u8>,
        content_type: String,
        etag: Option<String>,
    },
    Streaming(Body, String),
    Error(GatewayError),
}

/// Parses, admits and dispatches a request. The only HTTP-shaped thing
/// this function touches is `ctx` — everything else is the pure A-D-G
/// module chain.
pub async fn run(gateway: &Gateway, ctx: &RequestContext) -> Outcome {
    if ctx.raw_target == "/crossdomain.xml" || ctx.raw_target == "/crossdomain.xml?" {
        return Outcome::Rendered {
            body: CROSSDOMAIN_XML.to_vec(),
            content_type: "application/xml".to_string(),
            etag: None,
        };
    }

    let (path, query) = parse::split_target(&ctx.raw_target);
    let query_params = parse::parse_query(query);

    // POST delivers the whole command as its body (for argument lists too
    // long for a URL), ignoring the URL entirely, even when the body is
    // empty — an empty POST body is an empty command, not a fallback to
    // the URL. PUT appends its body as the final, undecoded argv element.
    // Grounded on `cmd.c::cmd_run`'s method dispatch.
    let command_source: Vec<u8> = if ctx.method == Method::POST {
        ctx.body.clone()
    } else {
        path.as_bytes().to_vec()
    };

    let mut parsed = match parse::parse_command_path(&command_source) {
        Ok(p) => p,
        Err(e) => return Outcome::Error(e),
    };

    if ctx.method == Method::PUT {
        parsed.argv.push(ctx.body.clone());
    }

    let verb_upper = parsed.verb_upper();
    let identity = ctx
        .authorization
        .as_deref()
        .and_then(acl::decode_basic_auth);

    if !gateway
        .acl
        .check(ctx.peer_ip, &parsed.argv[0], identity.as_deref())
    {
        return Outcome::Error(GatewayError::AclDenied);
    }

    let resolved_format = format::resolve(parsed.extension.as_deref(), &query_params);

    if verb_upper == "SUBSCRIBE" || verb_upper == "PSUBSCRIBE" {
        if parsed.argv.len() < 2 {
            return Outcome::Error(GatewayError::EmptyCommand);
        }
        let kind = if verb_upper == "PSUBSCRIBE" {
            SubscribeKind::Pattern
        } else {
            SubscribeKind::Channel
        };
        let channels = parsed.argv[1..].to_vec();
        let content_type = resolved_format.content_type.clone();
        return match pubsub::stream_body(Arc::clone(&gateway.upstream), verb_upper, kind, channels)
            .await
        {
            Ok(body) => Outcome::Streaming(body, content_type),
            Err(e) => Outcome::Error(e),
        };
    }

    let reply = match gateway.upstream.dispatch(&parsed.argv).await {
        Ok(reply) => reply,
        Err(e) => return Outcome::Error(e),
    };

    match reply::render(&resolved_format, &verb_upper, &reply, &query_params) {
        Ok(rendered) => Outcome::Rendered {
            etag: Some(reply::etag_for(&rendered.body)),
            body: rendered.body,
            content_type: rendered.content_type,
        },
        Err(e) => Outcome::Error(e),
    }
}

/// The single HTTP-translation site: every `Outcome` variant becomes a
/// `Response` here, and only here.
pub fn to_response(outcome: Outcome, ctx: &RequestContext) -> Response {
    let keep_alive = keep_alive_decision(ctx.version, ctx.connection_header.as_deref());

    let mut response = match outcome {
        Outcome::Error(err) => {
            let status = err.status();
            let body = serde_json::json!({ "error": err.to_string() }).to_string();
            let mut resp = (status, body).into_response();
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            resp
        }
        Outcome::Streaming(body, content_type) => {
            let mut resp = Response::new(body);
            let ct = HeaderValue::from_str(&content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/json"));
            resp.headers_mut().insert(header::CONTENT_TYPE, ct);
            resp.headers_mut().insert(
                header::TRANSFER_ENCODING,
                HeaderValue::from_static("chunked"),
            );
            resp
        }
        Outcome::Rendered {
            body,
            content_type,
            etag,
        } => {
            if let (Some(tag), Some(candidate)) = (&etag, &ctx.if_none_match) {
                if tag == candidate {
                    let mut resp = StatusCode::NOT_MODIFIED.into_response();
                    if let Ok(value) = HeaderValue::from_str(tag) {
                        resp.headers_mut().insert(header::ETAG, value);
                    }
                    apply_common_headers(&mut resp, keep_alive);
                    return resp;
                }
            }

            let mut resp = (StatusCode::OK, body).into_response();
            let ct = HeaderValue::from_str(&content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
            resp.headers_mut().insert(header::CONTENT_TYPE, ct);
            if let Some(tag) = &etag {
                if let Ok(value) = HeaderValue::from_str(tag) {
                    resp.headers_mut().insert(header::ETAG, value);
                }
            }
            resp
        }
    };

    apply_common_headers(&mut response, keep_alive);
    response
}

/// HTTP/1.0 defaults to close, HTTP/1.1 defaults to keep-alive; an
/// explicit `Connection` request header always wins. Grounded on
/// `client.c`'s keep-alive negotiation.
fn keep_alive_decision(version: Version, connection_header: Option<&str>) -> bool {
    match connection_header.map(|v| v.to_ascii_lowercase()) {
        Some(v) if v.contains("close") => false,
        Some(v) if v.contains("keep-alive") => true,
        _ => version != Version::HTTP_10,
    }
}

/// `Connection: Close` whenever the connection isn't kept alive;
/// `Connection: Keep-Alive` only when it is alive *and* the reply is a
/// plain 200 — any other status with keep-alive gets no `Connection`
/// header at all, matching the original's behavior exactly.
fn apply_connection_header(response: &mut Response, keep_alive: bool) {
    let status = response.status();
    let headers = response.headers_mut();
    if !keep_alive {
        headers.insert(header::CONNECTION, HeaderValue::from_static("Close"));
    } else if status == StatusCode::OK {
        headers.insert(header::CONNECTION, HeaderValue::from_static("Keep-Alive"));
    }
}

/// `Server` and `Connection` on every response. CORS headers are scoped
/// to the `OPTIONS` preflight response only (`handler::handle_options`),
/// matching `client.c::http_options` — the only place the original sets
/// them.
fn apply_common_headers(response: &mut Response, keep_alive: bool) {
    response
        .headers_mut()
        .insert(header::SERVER, HeaderValue::from_static("Webdis"));
    apply_connection_header(response, keep_alive);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_10_defaults_to_close() {
        assert!(!keep_alive_decision(Version::HTTP_10, None));
    }

    #[test]
    fn http_11_defaults_to_keep_alive() {
        assert!(keep_alive_decision(Version::HTTP_11, None));
    }

    #[test]
    fn explicit_close_header_overrides_http_11_default() {
        assert!(!keep_alive_decision(Version::HTTP_11, Some("close")));
    }

    #[test]
    fn explicit_keep_alive_header_overrides_http_10_default() {
        assert!(keep_alive_decision(Version::HTTP_10, Some("Keep-Alive")));
    }

    #[test]
    fn not_keep_alive_always_gets_close_header() {
        let mut resp = StatusCode::OK.into_response();
        apply_connection_header(&mut resp, false);
        assert_eq!(resp.headers().get(header::CONNECTION).unwrap(), "Close");
    }

    #[test]
    fn keep_alive_with_200_gets_keep_alive_header() {
        let mut resp = StatusCode::OK.into_response();
        apply_connection_header(&mut resp, true);
        assert_eq!(
            resp.headers().get(header::CONNECTION).unwrap(),
            "Keep-Alive"
        );
    }

    #[test]
    fn keep_alive_with_non_200_gets_no_connection_header() {
        let mut resp = StatusCode::NOT_MODIFIED.into_response();
        apply_connection_header(&mut resp, true);
        assert!(resp.headers().get(header::CONNECTION).is_none());
    }
}
