// src/pipeline/sources.rs

//! Source discovery: glob expansion and recursive directory listing.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use globset::Glob;

use crate::fs::FileSystem;

/// Render a relative path with forward slashes.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Every file below `dir`, sorted. A missing directory yields no files.
pub fn list_files(fs: &dyn FileSystem, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !fs.is_dir(dir) {
        return Ok(files);
    }

    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs.read_dir(&current)? {
            if fs.is_dir(&entry) {
                stack.push(entry);
            } else if fs.is_file(&entry) {
                files.push(entry);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Expand a root-relative glob into matching files, sorted.
///
/// Only the directory prefix before the first wildcard is walked.
pub fn expand_glob(fs: &dyn FileSystem, root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let matcher = Glob::new(pattern)
        .with_context(|| format!("invalid glob pattern '{pattern}'"))?
        .compile_matcher();

    let base = literal_prefix(pattern);
    let files = list_files(fs, &root.join(&base))?;

    Ok(files
        .into_iter()
        .filter(|path| {
            path.strip_prefix(root)
                .map(|rel| matcher.is_match(to_slash(rel)))
                .unwrap_or(false)
        })
        .collect())
}

/// Directory part of a glob that contains no glob metacharacters.
fn literal_prefix(pattern: &str) -> PathBuf {
    let mut prefix = PathBuf::new();
    let segments: Vec<&str> = pattern.split('/').collect();
    for (idx, segment) in segments.iter().enumerate() {
        if idx + 1 == segments.len() || segment.contains(['*', '?', '[', '{']) {
            break;
        }
        prefix.push(segment);
    }
    prefix
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
