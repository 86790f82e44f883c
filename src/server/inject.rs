// src/server/inject.rs

//! Client script injection into HTML responses.

use super::CLIENT_PATH;

pub fn script_tag() -> String {
    format!(r#"<script src="{CLIENT_PATH}" async></script>"#)
}

/// Whether a `Content-Type` value denotes an HTML document.
pub fn is_html(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("text/html"))
}

/// Insert the client script right before the last `</body>`, or append it
/// when there is none. Already-injected documents are left alone.
pub fn inject_client(html: &str) -> String {
    let tag = script_tag();
    if html.contains(&tag) {
        return html.to_string();
    }

    match html.to_ascii_lowercase().rfind("</body>") {
        Some(idx) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..idx]);
            out.push_str(&tag);
            out.push_str(&html[idx..]);
            out
        }
        None => format!("{html}{tag}"),
    }
}
