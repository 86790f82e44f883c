// src/pipeline/styles.rs

//! Stylesheet pipeline: SCSS compile (`grass`), then vendor prefixing and
//! optional minification (`lightningcss`) for the configured browsers.

use anyhow::{anyhow, Result};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;
use tracing::debug;

use crate::pipeline::{PipelineContext, TaskReport};
use crate::types::BuildMode;

/// Development sourcemaps go here, relative to the stylesheet.
const MAPS_DIR: &str = "maps";

/// A compiled stylesheet. Development builds carry a sourcemap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledCss {
    pub code: String,
    pub map: Option<String>,
}

pub fn run(ctx: &PipelineContext, mode: BuildMode) -> TaskReport {
    let cfg = ctx.config.styles();
    let main = ctx.resolve(&cfg.main_file);
    let filename = cfg.filename_for(mode.is_production());
    let out_path = ctx.resolve(&cfg.output_dir).join(filename);

    let result = compile(ctx, mode).and_then(|css| {
        let mut outputs = Vec::new();
        let mut code = css.code;
        if let Some(map) = css.map {
            let map_path = out_path.with_file_name(MAPS_DIR).join(format!("{filename}.map"));
            code.push_str(&format!("\n/*# sourceMappingURL={MAPS_DIR}/{filename}.map */\n"));
            ctx.write_artifact(&out_path, code.as_bytes())?;
            ctx.write_artifact(&map_path, map.as_bytes())?;
            outputs.push(out_path.clone());
            outputs.push(map_path);
        } else {
            ctx.write_artifact(&out_path, code.as_bytes())?;
            outputs.push(out_path.clone());
        }
        Ok(outputs)
    });

    TaskReport::from_result(&main, result)
}

/// Compile the main stylesheet and prefix it.
///
/// `grass` emits no sourcemap, so the development map points into its
/// expanded output, which the map embeds as the source content.
pub fn compile(ctx: &PipelineContext, mode: BuildMode) -> Result<CompiledCss> {
    let cfg = ctx.config.styles();
    let main = ctx.resolve(&cfg.main_file);
    let source = ctx.fs.read_to_string(&main)?;

    let mut options = grass::Options::default().style(if mode.is_production() {
        grass::OutputStyle::Compressed
    } else {
        grass::OutputStyle::Expanded
    });
    if let Some(dir) = main.parent() {
        options = options.load_path(dir);
    }
    for include in &cfg.include_paths {
        options = options.load_path(ctx.resolve(include));
    }

    let css = grass::from_string(source, &options)
        .map_err(|e| anyhow!("{}: {e}", ctx.display_path(&main)))?;
    debug!(file = %ctx.display_path(&main), bytes = css.len(), "compiled scss");

    transform(
        &css,
        &ctx.display_path(&main),
        &cfg.browsers,
        mode.is_production(),
        !mode.is_production(),
    )
}

/// Add the vendor prefixes `browsers` need. `minify` also strips whitespace
/// and merges rules.
pub fn prefix(css: &str, filename: &str, browsers: &[String], minify: bool) -> Result<String> {
    Ok(transform(css, filename, browsers, minify, false)?.code)
}

fn transform(
    css: &str,
    filename: &str,
    browsers: &[String],
    minify: bool,
    with_map: bool,
) -> Result<CompiledCss> {
    let browsers = Browsers::from_browserslist(browsers.iter().map(String::as_str))
        .map_err(|e| anyhow!("invalid browser targets: {e}"))?;
    let targets = Targets {
        browsers,
        ..Targets::default()
    };

    let mut sheet = StyleSheet::parse(
        css,
        ParserOptions {
            filename: filename.to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| anyhow!("{filename}: {e}"))?;

    sheet
        .minify(MinifyOptions {
            targets: targets.clone(),
            ..MinifyOptions::default()
        })
        .map_err(|e| anyhow!("{filename}: {e}"))?;

    let mut source_map = if with_map {
        let mut map = SourceMap::new("/");
        let index = map.add_source(filename);
        map.set_source_content(index as usize, css)
            .map_err(|e| anyhow!("{filename}: sourcemap: {e}"))?;
        Some(map)
    } else {
        None
    };

    let out = sheet
        .to_css(PrinterOptions {
            minify,
            targets,
            source_map: source_map.as_mut(),
            ..PrinterOptions::default()
        })
        .map_err(|e| anyhow!("{filename}: {e}"))?;

    let map = match source_map.as_mut() {
        Some(map) => Some(
            map.to_json(None)
                .map_err(|e| anyhow!("{filename}: sourcemap: {e}"))?,
        ),
        None => None,
    };

    Ok(CompiledCss { code: out.code, map })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn old_safari_gets_webkit_prefix() {
        let css = ".menu { user-select: none; }";
        let out = prefix(css, "style.css", &["safari 8".to_string()], false).unwrap();
        assert!(out.contains("-webkit-user-select: none"), "{out}");
    }

    #[test]
    fn minify_removes_whitespace() {
        let css = ".a {\n  color: red;\n}\n";
        let out = prefix(css, "style.css", &["last 2 versions".to_string()], true).unwrap();
        assert_eq!(out, ".a{color:red}");
    }

    #[test]
    fn development_map_covers_the_compiled_source() {
        let css = ".a {\n  user-select: none;\n}\n";
        let out = transform(css, "assets/src/scss/style.scss", &["safari 8".to_string()], false, true).unwrap();

        let map: serde_json::Value = serde_json::from_str(out.map.as_deref().unwrap()).unwrap();
        assert_eq!(map["version"], 3);
        assert!(map["sources"][0].as_str().unwrap().ends_with("style.scss"));
        assert!(!map["mappings"].as_str().unwrap().is_empty());
    }

    #[test]
    fn bad_browser_query_is_an_error() {
        assert!(prefix(".a{}", "style.css", &["not a real browser 99".to_string()], false).is_err());
    }
}
