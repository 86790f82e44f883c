// src/server/local.rs

//! Local-server mode: static files from the configured base dirs.

use std::path::{Component, Path, PathBuf};

use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use tracing::{debug, warn};

use super::inject::inject_client;

/// Map a request path onto a file below one of `base_dirs`.
///
/// The first base dir containing the path wins; directories resolve to
/// their `index.html`. The path is percent-decoded first. Returns
/// `Err(FORBIDDEN)` for traversal attempts and `Err(BAD_REQUEST)` when the
/// decoded path is not UTF-8.
pub fn resolve(base_dirs: &[PathBuf], request_path: &str) -> Result<Option<PathBuf>, StatusCode> {
    let decoded = percent_decode_str(request_path)
        .decode_utf8()
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    let rel = Path::new(decoded.trim_start_matches('/'));
    if rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(StatusCode::FORBIDDEN);
    }

    for base in base_dirs {
        let candidate = base.join(rel);
        if candidate.is_dir() {
            let index = candidate.join("index.html");
            if index.is_file() {
                return Ok(Some(index));
            }
        } else if candidate.is_file() {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

pub async fn serve(base_dirs: &[PathBuf], uri: &Uri) -> Response {
    let path = uri.path();
    let file = match resolve(base_dirs, path) {
        Ok(Some(file)) => file,
        Ok(None) => {
            debug!(path = %path, "not found");
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(status) => return status.into_response(),
    };

    let bytes = match tokio::fs::read(&file).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(file = %file.display(), error = %err, "failed to read file");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mime = content_type(&file);
    if mime.starts_with("text/html") {
        let html = inject_client(&String::from_utf8_lossy(&bytes));
        return ([(header::CONTENT_TYPE, mime)], html).into_response();
    }
    ([(header::CONTENT_TYPE, mime)], bytes).into_response()
}

fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "map" | "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
