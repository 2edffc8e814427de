//! Persisted sync history.
//!
//! Each completed sync cycle appends one record to a JSON log under the
//! state directory, bounded to the most recent entries. Bookkeeping only;
//! planning never reads it.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Maximum records kept in the log.
pub const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Every planned action completed.
    Success,
    /// One or more per-path errors; counts tell the story.
    Partial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRecord {
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub pushed: usize,
    pub pulled: usize,
    pub conflicts: usize,
    pub skipped: usize,
    pub errors: usize,
    pub status: SyncStatus,
}

/// Load the history log, newest last. Missing or unreadable logs start
/// fresh rather than failing the cycle.
pub fn load(path: &Path) -> Vec<SyncRecord> {
    if !path.exists() {
        return Vec::new();
    }
    match fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str(&data) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding malformed history log");
                Vec::new()
            }
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read history log");
            Vec::new()
        }
    }
}

/// Append one record, keeping at most [`HISTORY_LIMIT`] entries.
/// Atomic write (temp file, then rename).
pub fn append(path: &Path, record: SyncRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut records = load(path);
    records.push(record);
    if records.len() > HISTORY_LIMIT {
        let excess = records.len() - HISTORY_LIMIT;
        records.drain(..excess);
    }

    let temp = path.with_extension("tmp");
    fs::write(&temp, serde_json::to_vec_pretty(&records)?)?;
    fs::rename(&temp, path)?;

    Ok(())
}
