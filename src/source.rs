//! Reading receiver logs from disk.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Reads a log into lines. Files ending in `.gz` are decompressed. Bytes
/// that are not valid UTF-8 (common on corrupted lines) are replaced rather
/// than failing the whole log.
pub fn read_log_lines(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let raw = std::fs::read(path).with_context(|| format!("reading log '{}'", path.display()))?;

    let bytes = if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        let mut decoded = Vec::new();
        GzDecoder::new(raw.as_slice())
            .read_to_end(&mut decoded)
            .with_context(|| format!("decompressing log '{}'", path.display()))?;
        decoded
    } else {
        raw
    };

    let lines: Vec<String> = String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::to_string)
        .collect();

    debug!(path = %path.display(), lines = lines.len(), "Log read");
    Ok(lines)
}
