//! Append-only log of every frame received on the channel.
//!
//! Entries are recorded before any decoding or session filtering, so the log
//! also shows malformed frames and traffic for other executions.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::now_timestamp;

/// One received frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Receive time, RFC 3339.
    pub timestamp: String,
    /// Frame text exactly as received.
    #[serde(rename = "data")]
    pub raw_data: String,
    /// Parsed frame, absent if decoding failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Value>,
}

impl HistoryEntry {
    /// Approximate memory footprint in bytes.
    #[must_use]
    pub fn approx_bytes(&self) -> usize {
        const OVERHEAD: usize = 8;
        self.timestamp.len() + self.raw_data.len() * 2 + OVERHEAD
    }
}

/// Message history log.
#[derive(Debug, Default)]
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
    total_bytes: usize,
}

impl HistoryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame, stamped with the current time.
    pub fn record(&mut self, raw: impl Into<String>, parsed: Option<Value>) -> &HistoryEntry {
        self.push(HistoryEntry {
            timestamp: now_timestamp(),
            raw_data: raw.into(),
            parsed,
        })
    }

    /// Append a prepared entry.
    pub fn push(&mut self, entry: HistoryEntry) -> &HistoryEntry {
        self.total_bytes = self.total_bytes.saturating_add(entry.approx_bytes());
        let index = self.entries.len();
        self.entries.push(entry);
        &self.entries[index]
    }

    /// Drop every entry and reset the byte count.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }

    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Approximate size of the recorded frames.
    #[must_use]
    pub const fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Entries whose frame could not be decoded.
    pub fn undecodable(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().filter(|e| e.parsed.is_none())
    }

    /// Write the log as JSON lines, one entry per line.
    ///
    /// # Errors
    /// Returns error if writing fails.
    pub fn write_jsonl<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for entry in &self.entries {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()
    }

    /// Raw frames in arrival order, for replaying through a session.
    pub fn raw_frames(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.raw_data.as_str())
    }
}
