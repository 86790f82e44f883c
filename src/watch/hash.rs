// src/watch/hash.rs

//! Content hashing for `[watch].use_hash`.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use blake3::Hasher;
use tracing::debug;

use crate::fs::FileSystem;

pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let bytes = fs.read(path)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Aggregate hash over per-file `(path, hash)` pairs.
///
/// Paths take part in the hash, so renaming a file changes it too.
pub fn compute_aggregate_hash<'a>(entries: impl IntoIterator<Item = (&'a Path, &'a str)>) -> String {
    let mut hasher = Hasher::new();
    for (path, hash) in entries {
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(&[0]);
        hasher.update(hash.as_bytes());
    }
    let hash = hasher.finalize().to_hex().to_string();
    debug!(hash = %hash, "computed aggregate hash");
    hash
}

/// Abstract storage for task hashes.
pub trait HashStore: Send + Sync {
    fn load(&self, task: &str) -> Option<String>;
    fn save(&mut self, task: &str, hash: &str);
}

/// Hashes live for the watch session only.
#[derive(Debug, Default)]
pub struct MemoryHashStore {
    map: HashMap<String, String>,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HashStore for MemoryHashStore {
    fn load(&self, task: &str) -> Option<String> {
        self.map.get(task).cloned()
    }

    fn save(&mut self, task: &str, hash: &str) {
        self.map.insert(task.to_string(), hash.to_string());
        debug!(task = %task, hash = %hash, "stored task hash");
    }
}
