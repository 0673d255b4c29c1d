//! Append-only run history. Each successful run can record the snapshot it
//! saved, so score series (PageSpeed) survive the baseline being replaced.

use serde::{Deserialize, Serialize};
use snapwatch_core::{EpochSecs, RunId, Snapshot};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub run_id: RunId,
    pub recorded_at: EpochSecs,
    pub fingerprint: String,
    pub snapshot: Snapshot,
}

impl HistoryEntry {
    pub fn new(run_id: RunId, recorded_at: EpochSecs, snapshot: Snapshot) -> Self {
        Self { run_id, recorded_at, fingerprint: snapshot.fingerprint(), snapshot }
    }
}

/// One compact JSON document per line.
pub fn encode_line(entry: &HistoryEntry) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    Ok(line)
}

/// Decode a history log, skipping blank lines. A line that fails to parse
/// (a torn final append) is logged and skipped.
pub fn decode_lines(text: &str) -> Vec<HistoryEntry> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| match serde_json::from_str(l) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable history line");
                None
            }
        })
        .collect()
}
