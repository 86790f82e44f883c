// src/server/proxy.rs

//! Proxy mode: forward every request to the target site.

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::warn;

use super::inject::{inject_client, is_html};

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Headers that describe the hop or the original body encoding; both are
/// rewritten on the way through.
const SKIPPED_HEADERS: [header::HeaderName; 5] = [
    header::HOST,
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::CONTENT_LENGTH,
    header::CONTENT_ENCODING,
];

pub async fn forward(client: &reqwest::Client, target: &str, req: Request) -> Response {
    match forward_inner(client, target, req).await {
        Ok(response) => response,
        Err(err) => {
            let message = format!("{err:#}");
            warn!(upstream = %target, error = %message, "proxy request failed");
            (StatusCode::BAD_GATEWAY, format!("assetdag proxy error: {err}")).into_response()
        }
    }
}

async fn forward_inner(client: &reqwest::Client, target: &str, req: Request) -> anyhow::Result<Response> {
    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{target}{path_and_query}");

    let body = to_bytes(body, MAX_BODY_BYTES).await?;
    let mut headers = copy_headers(&parts.headers);
    // Ask for an uncompressed body so HTML can be rewritten.
    headers.remove(header::ACCEPT_ENCODING);

    let upstream = client
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    let headers = copy_headers(upstream.headers());
    let html = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_html);
    let bytes = upstream.bytes().await?;

    let body = if html {
        Body::from(inject_client(&String::from_utf8_lossy(&bytes)))
    } else {
        Body::from(bytes)
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn copy_headers(source: &HeaderMap) -> HeaderMap {
    let mut out = source.clone();
    for name in &SKIPPED_HEADERS {
        out.remove(name);
    }
    out
}
