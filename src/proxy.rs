//! Streaming HTTP passthrough between the public endpoint and worker ports.
//!
//! Bodies stream in both directions without full buffering, supporting
//! large payloads and long-lived connections; when the client goes away the
//! upstream connection is dropped with it. Response headers that would
//! block iframe embedding or are transport-only are stripped before relay.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::Response;

use crate::error::{GatewayError, Result};

/// Headers removed from relayed responses: frame-blocking ones so sessions
/// render inside the front end, transport-only ones because the relay
/// re-frames the body itself.
pub const STRIPPED_RESPONSE_HEADERS: [&str; 4] = [
    "x-frame-options",
    "content-security-policy",
    "transfer-encoding",
    "connection",
];

pub fn build_target_url(worker_ip: &str, port: u16, path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) => format!("http://{worker_ip}:{port}/{path}?{q}"),
        None => format!("http://{worker_ip}:{port}/{path}"),
    }
}

pub fn filter_response_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if !STRIPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Forward `req` to `target_url`, overriding the host header to the worker's
/// address, and stream the response back.
pub async fn relay(
    client: &reqwest::Client,
    req: Request,
    target_url: &str,
    host: &str,
) -> Result<Response> {
    let (parts, body) = req.into_parts();

    let mut headers = parts.headers;
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONNECTION);
    if let Ok(value) = HeaderValue::from_str(host) {
        headers.insert(header::HOST, value);
    }

    let upstream = client
        .request(parts.method, target_url)
        .headers(headers)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await
        .map_err(|e| GatewayError::Worker(e.to_string()))?;

    let status = upstream.status();
    let response_headers = filter_response_headers(upstream.headers());

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}
