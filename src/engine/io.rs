// src/engine/io.rs
//
// I/O operations: input enumeration, output naming, atomic writes, dropped paths

use crate::error::{BatchError, Result};
use crate::ops::{is_eligible, OutputFormat};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// List the eligible image files directly inside `input_dir`.
///
/// Non-recursive. Only regular files (after following symlinks) whose name
/// ends with an allow-listed extension are returned, sorted by name.
/// Any failure to read the directory itself is an `EnumerationFailed` error.
pub fn list_eligible_files(input_dir: &Path) -> Result<Vec<String>> {
    let display = input_dir.display().to_string();
    let entries =
        fs::read_dir(input_dir).map_err(|e| BatchError::enumeration_failed(display.clone(), e))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| BatchError::enumeration_failed(display.clone(), e))?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            warn!(name = ?file_name, "skipping non UTF-8 file name");
            continue;
        };
        if !is_eligible(name) {
            continue;
        }
        match fs::metadata(entry.path()) {
            Ok(meta) if meta.is_file() => names.push(name.to_string()),
            Ok(_) => debug!(name, "skipping non-regular entry"),
            Err(e) => debug!(name, error = %e, "skipping unreadable entry"),
        }
    }
    names.sort();
    Ok(names)
}

/// Output file name: input stem (last extension stripped) plus the format's
/// lowercase name. Leading dots are part of the stem, so `.png` keeps its name.
pub fn output_file_name(input_name: &str, format: OutputFormat) -> String {
    let leading = input_name.len() - input_name.trim_start_matches('.').len();
    let stem = match input_name[leading..].rfind('.') {
        Some(dot) => &input_name[..leading + dot],
        None => input_name,
    };
    format!("{stem}.{}", format.extension())
}

/// Write `bytes` to `output_dir/file_name` atomically, replacing any existing file.
///
/// Data goes to a temp file in the same directory, is synced, then renamed
/// over the destination. Readers never see a partially written image.
pub fn write_atomic(output_dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let output_path = output_dir.join(file_name);

    let mut temp_file = NamedTempFile::new_in(output_dir)
        .map_err(|e| BatchError::write_failed(output_dir.display().to_string(), e))?;

    let temp_path = temp_file.path().to_path_buf();
    temp_file
        .write_all(bytes)
        .map_err(|e| BatchError::write_failed(temp_path.display().to_string(), e))?;
    temp_file
        .as_file_mut()
        .sync_all()
        .map_err(|e| BatchError::write_failed(temp_path.display().to_string(), e))?;

    temp_file
        .persist(&output_path)
        .map_err(|e| BatchError::write_failed(output_path.display().to_string(), e.error))?;

    Ok(output_path)
}

/// Clean up a path string produced by desktop drag-and-drop.
///
/// Whitespace and the `{}` braces wrapped around paths containing spaces are
/// trimmed. Anything that is not an existing directory is rejected.
pub fn normalize_dropped_path(raw: &str) -> Result<PathBuf> {
    let cleaned = raw.trim().trim_matches(|c| c == '{' || c == '}').trim();
    if cleaned.is_empty() {
        return Err(BatchError::invalid_dropped_path(raw.to_string()));
    }

    let path = PathBuf::from(cleaned);
    if path.is_dir() {
        Ok(path)
    } else {
        warn!(path = %path.display(), "dropped path is not a folder");
        Err(BatchError::invalid_dropped_path(cleaned.to_string()))
    }
}
