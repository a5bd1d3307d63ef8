use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Reads and deserializes a JSON file, returning `None` when the file is
/// absent or fails to parse. Callers supply their own defaults.
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

/// Reads a JSONL file into raw values, skipping blank and malformed lines.
///
/// A missing file yields an empty vector; an unreadable file that exists
/// (e.g. permission failure) propagates as an error.
pub fn read_jsonl_values(path: &Path) -> Result<Vec<Value>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = fs::File::open(path)
        .with_context(|| format!("failed to open jsonl file {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut values = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| {
            format!("failed to read line {} from {}", index + 1, path.display())
        })?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(value) => values.push(value),
            // Malformed records are skipped, never abort the stream.
            Err(_) => continue,
        }
    }
    Ok(values)
}
