// src/pipeline/svg.rs

//! SVG minification and `<symbol>` sprite assembly.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use tracing::warn;

use crate::pipeline::sources::list_files;
use crate::pipeline::{PipelineContext, TaskReport};

static PROLOG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<\?xml.*?\?>|<!DOCTYPE[^>]*>|<!--.*?-->|<metadata\b.*?</metadata>")
        .expect("valid regex")
});
/// Elements whose content is whitespace-sensitive.
static PRESERVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<text\b.*?</text>|<style\b.*?</style>|<script\b.*?</script>|<!\[CDATA\[.*?\]\]>")
        .expect("valid regex")
});
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("<\u{1}(\\d+)/>").expect("valid regex"));
static BETWEEN_TAGS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r">\s+<").expect("valid regex"));
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static SVG_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<svg\b([^>]*)>").expect("valid regex"));
static VIEWBOX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"viewBox\s*=\s*"([^"]*)""#).expect("valid regex"));
static WIDTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\swidth\s*=\s*"([\d.]+)(?:px)?""#).expect("valid regex"));
static HEIGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sheight\s*=\s*"([\d.]+)(?:px)?""#).expect("valid regex"));

/// Drop the XML prolog, comments and metadata, and collapse whitespace
/// outside `<text>`, `<style>`, `<script>` and CDATA content.
pub fn minify(svg: &str) -> String {
    let stripped = PROLOG_RE.replace_all(svg, "");

    let mut kept = Vec::new();
    let masked = PRESERVE_RE.replace_all(&stripped, |caps: &regex::Captures<'_>| {
        kept.push(caps[0].to_string());
        format!("<\u{1}{}/>", kept.len() - 1)
    });

    let tight = BETWEEN_TAGS_RE.replace_all(&masked, "><");
    let collapsed = WHITESPACE_RE.replace_all(&tight, " ");
    PLACEHOLDER_RE
        .replace_all(collapsed.trim(), |caps: &regex::Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| kept.get(i))
                .cloned()
                .unwrap_or_default()
        })
        .into_owned()
}

/// Turn one icon into a `<symbol>` with the given id.
pub fn symbol(id: &str, svg: &str) -> Result<String> {
    let min = minify(svg);
    let open = SVG_OPEN_RE
        .captures(&min)
        .ok_or_else(|| anyhow!("no <svg> root element"))?;
    let (Some(whole), Some(attrs)) = (open.get(0), open.get(1)) else {
        return Err(anyhow!("no <svg> root element"));
    };
    let close = min
        .rfind("</svg>")
        .filter(|&idx| idx >= whole.end())
        .ok_or_else(|| anyhow!("unterminated <svg> element"))?;
    let inner = &min[whole.end()..close];

    let view_box = VIEWBOX_RE
        .captures(attrs.as_str())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| {
            let w = WIDTH_RE.captures(attrs.as_str())?.get(1)?.as_str().to_string();
            let h = HEIGHT_RE.captures(attrs.as_str())?.get(1)?.as_str().to_string();
            Some(format!("0 0 {w} {h}"))
        });

    Ok(match view_box {
        Some(vb) => format!(r#"<symbol id="{id}" viewBox="{vb}">{inner}</symbol>"#),
        None => format!(r#"<symbol id="{id}">{inner}</symbol>"#),
    })
}

/// Combine `(id, svg)` pairs into one sprite document.
pub fn sprite<'a>(icons: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<String> {
    let mut out = String::from(r#"<svg xmlns="http://www.w3.org/2000/svg">"#);
    for (id, svg) in icons {
        out.push_str(&symbol(id, svg).with_context(|| format!("icon '{id}'"))?);
    }
    out.push_str("</svg>");
    Ok(out)
}

/// Build the icon sprite from every `*.svg` directly in the icon dir.
pub fn run(ctx: &PipelineContext) -> TaskReport {
    let media = ctx.config.media();
    let src_dir = ctx.resolve(&media.icon_source_dir);
    let out_path = ctx.resolve(&media.icon_output_dir).join(&media.sprite_filename);

    let result = build_sprite(ctx, &src_dir).and_then(|doc| {
        ctx.write_artifact(&out_path, doc.as_bytes())?;
        Ok(vec![out_path.clone()])
    });

    TaskReport::from_result(&src_dir, result)
}

fn build_sprite(ctx: &PipelineContext, src_dir: &Path) -> Result<String> {
    let mut icons = Vec::new();
    for file in list_files(ctx.fs.as_ref(), src_dir)? {
        let is_svg = file
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));
        if !is_svg || file.parent() != Some(src_dir) {
            continue;
        }
        let Some(id) = file.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        icons.push((id.to_string(), ctx.fs.read_to_string(&file)?));
    }

    if icons.is_empty() {
        warn!(dir = %ctx.display_path(src_dir), "no icons found; writing an empty sprite");
    }

    sprite(icons.iter().map(|(id, svg)| (id.as_str(), svg.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_keeps_view_box_and_children() {
        let icon = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24">
            <path d="M1 1h22"/>
        </svg>"#;
        assert_eq!(
            symbol("arrow", icon).unwrap(),
            r#"<symbol id="arrow" viewBox="0 0 24 24"><path d="M1 1h22"/></symbol>"#
        );
    }

    #[test]
    fn symbol_derives_view_box_from_size() {
        let icon = r#"<svg width="16px" height="8"><rect/></svg>"#;
        assert_eq!(
            symbol("bar", icon).unwrap(),
            r#"<symbol id="bar" viewBox="0 0 16 8"><rect/></symbol>"#
        );
    }

    #[test]
    fn minify_keeps_whitespace_in_text_and_style() {
        let icon = "<svg>\n  <style>\n    .a { fill: red; }\n  </style>\n  <g>\n    <path d=\"M0   0\"/>\n  </g>\n  <text x=\"1\"><tspan>Hello</tspan> <tspan>world</tspan></text>\n</svg>";
        assert_eq!(
            minify(icon),
            "<svg><style>\n    .a { fill: red; }\n  </style><g><path d=\"M0 0\"/></g><text x=\"1\"><tspan>Hello</tspan> <tspan>world</tspan></text></svg>"
        );
    }

    #[test]
    fn sprite_fails_on_non_svg_input() {
        let err = sprite([("ok", "<svg><g/></svg>"), ("bad", "hello")]).unwrap_err();
        assert!(format!("{err:#}").contains("icon 'bad'"));
    }
}
