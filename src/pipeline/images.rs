// src/pipeline/images.rs

//! Image compression. Mirrors the image source tree into the output dir.
//!
//! Every file is processed independently: a file that fails to decode is
//! recorded as a failure and the rest are still written.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use tracing::{debug, warn};

use crate::pipeline::sources::list_files;
use crate::pipeline::svg;
use crate::pipeline::{FileFailure, PipelineContext, TaskReport};

const PNG_PRESET: u8 = 2;
const JPEG_QUALITY: u8 = 85;

pub fn run(ctx: &PipelineContext) -> TaskReport {
    let media = ctx.config.media();
    let src_dir = ctx.resolve(&media.image_source_dir);
    let out_dir = ctx.resolve(&media.image_output_dir);
    let mut report = TaskReport::default();

    let files = match list_files(ctx.fs.as_ref(), &src_dir) {
        Ok(files) => files,
        Err(err) => return TaskReport::failed(src_dir, format!("{err:#}")),
    };
    if files.is_empty() {
        warn!(dir = %ctx.display_path(&src_dir), "no images found");
    }

    for file in files {
        let Some(kind) = ImageKind::from_path(&file) else {
            debug!(file = %ctx.display_path(&file), "skipping non-image file");
            continue;
        };
        let out_path = output_path(&src_dir, &out_dir, &file);

        match compress_file(ctx, &file, kind).and_then(|bytes| ctx.write_artifact(&out_path, &bytes)) {
            Ok(()) => report.outputs.push(out_path),
            Err(err) => {
                let message = format!("{err:#}");
                warn!(file = %ctx.display_path(&file), error = %message, "image failed");
                report.failures.push(FileFailure { path: file, message });
            }
        }
    }

    report
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Ico,
    Svg,
}

impl ImageKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "ico" => Some(Self::Ico),
            "svg" => Some(Self::Svg),
            _ => None,
        }
    }
}

fn compress_file(ctx: &PipelineContext, path: &Path, kind: ImageKind) -> Result<Vec<u8>> {
    let data = ctx.fs.read(path)?;
    compress(&data, kind).with_context(|| format!("compressing {}", ctx.display_path(path)))
}

/// Compress one image. Never returns output larger than the input.
pub fn compress(data: &[u8], kind: ImageKind) -> Result<Vec<u8>> {
    let out = match kind {
        ImageKind::Png => oxipng::optimize_from_memory(data, &oxipng::Options::from_preset(PNG_PRESET))
            .map_err(|e| anyhow!("invalid png: {e}"))?,
        ImageKind::Jpeg => {
            let img = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?;
            encode_jpeg(&img)?
        }
        // Lossless recompression of these is not worth it; validate and copy.
        ImageKind::Gif => {
            image::load_from_memory_with_format(data, ImageFormat::Gif)?;
            data.to_vec()
        }
        ImageKind::Ico => {
            image::load_from_memory_with_format(data, ImageFormat::Ico)?;
            data.to_vec()
        }
        ImageKind::Svg => {
            let text = std::str::from_utf8(data).context("svg is not valid UTF-8")?;
            if !text.contains("<svg") {
                bail!("not an svg document");
            }
            svg::minify(text).into_bytes()
        }
    };

    Ok(if out.len() < data.len() { out } else { data.to_vec() })
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))?;
    Ok(buf.into_inner())
}

/// Output location mirroring `file`'s place under `src_dir`.
pub fn output_path(src_dir: &Path, out_dir: &Path, file: &Path) -> PathBuf {
    out_dir.join(file.strip_prefix(src_dir).unwrap_or(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_extension_is_case_insensitive() {
        assert_eq!(ImageKind::from_path(Path::new("a/B.PNG")), Some(ImageKind::Png));
        assert_eq!(ImageKind::from_path(Path::new("a/b.jpeg")), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_path(Path::new("a/b.txt")), None);
    }

    #[test]
    fn corrupt_png_is_an_error() {
        assert!(compress(b"definitely not a png", ImageKind::Png).is_err());
    }

    #[test]
    fn svg_shrinks() {
        let svg = "<?xml version=\"1.0\"?>\n<!-- icon -->\n<svg viewBox=\"0 0 1 1\">\n  <path d=\"M0 0\"/>\n</svg>\n";
        let out = compress(svg.as_bytes(), ImageKind::Svg).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "<svg viewBox=\"0 0 1 1\"><path d=\"M0 0\"/></svg>");
    }
}
