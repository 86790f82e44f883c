// src/pipeline/size.rs

//! Raw and gzip size reporting for written artifacts.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{info, warn};

/// Size of `bytes` after gzip at the default level.
pub fn gzip_size(bytes: &[u8]) -> std::io::Result<u64> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?.len() as u64)
}

pub fn log_size(file: &str, bytes: &[u8]) {
    match gzip_size(bytes) {
        Ok(gzip) => info!(file = %file, bytes = bytes.len(), gzip, "wrote artifact"),
        Err(err) => {
            warn!(file = %file, bytes = bytes.len(), error = %err, "wrote artifact; gzip size unavailable")
        }
    }
}
