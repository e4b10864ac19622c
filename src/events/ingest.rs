//! Event readers: JSON Lines or a single JSON array.

use super::{EventError, RawEvent, RawRecord};
use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::info;

/// Read JSON Lines, one record per line. Blank lines are skipped.
pub fn read_jsonl<R: BufRead>(reader: R) -> Result<Vec<RawEvent>, EventError> {
    let mut events = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: RawRecord = serde_json::from_str(&line)
            .map_err(|source| EventError::Malformed { line: i + 1, source })?;
        events.push(record.into_event(events.len())?);
    }
    Ok(events)
}

/// Read a JSON array of records.
pub fn read_json_array<R: Read>(reader: R) -> Result<Vec<RawEvent>, EventError> {
    let records: Vec<RawRecord> = serde_json::from_reader(reader)
        .map_err(|source| EventError::Malformed { line: 1, source })?;
    from_records(records)
}

/// Validate already-deserialized records.
pub fn from_records(records: Vec<RawRecord>) -> Result<Vec<RawEvent>, EventError> {
    records
        .into_iter()
        .enumerate()
        .map(|(i, r)| r.into_event(i))
        .collect()
}

/// Parse event text, picking the format from the first non-whitespace byte.
pub fn parse_str(text: &str) -> Result<Vec<RawEvent>, EventError> {
    if text.trim_start().starts_with('[') {
        read_json_array(text.as_bytes())
    } else {
        read_jsonl(text.as_bytes())
    }
}

/// Load events from a file on disk.
pub fn load_path(path: &Path) -> Result<Vec<RawEvent>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open event file: {}", path.display()))?;
    let mut text = String::new();
    BufReader::new(file)
        .read_to_string(&mut text)
        .with_context(|| format!("failed to read event file: {}", path.display()))?;
    let events = parse_str(&text)
        .with_context(|| format!("invalid events in {}", path.display()))?;
    info!(path = %path.display(), count = events.len(), "loaded raw events");
    Ok(events)
}
