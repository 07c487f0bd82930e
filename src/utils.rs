//! Utility functions

use std::path::PathBuf;

/// Format byte size in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Relative path of a stored object, fanned out into `Dir-NNN` directories
/// so that no directory holds more than a thousand entries.
///
/// `1234567` becomes `Dir-001/Dir-234/1234567`.
pub fn fanout_path(id: u64) -> PathBuf {
    let mut dirs = Vec::new();
    let mut remaining = id;
    while remaining > 999 {
        remaining /= 1000;
        dirs.push(format!("Dir-{:03}", remaining % 1000));
    }

    let mut path = PathBuf::new();
    for dir in dirs.iter().rev() {
        path.push(dir);
    }
    path.push(id.to_string());
    path
}

/// Key of a chunk inside a dataset directory
pub fn chunk_key(coords: &[u64]) -> String {
    let parts: Vec<String> = coords.iter().map(|c| c.to_string()).collect();
    format!("chunks/{}", parts.join("."))
}
