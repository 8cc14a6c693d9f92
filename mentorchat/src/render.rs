//! Plain-text rendering of transcript snapshots.
//!
//! [`TranscriptPrinter`] remembers what it has already shown and, for each
//! new snapshot, yields only the lines that are new or whose delivery state
//! changed. The CLI prints those lines to stdout.

use std::collections::HashMap;
use std::fmt::Write as _;

use mentorchat_proto::message::{ClientRef, MessageId, Origin, Timestamp};

use crate::transcript::{DeliveryState, TranscriptEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EntryKey {
    Local(ClientRef),
    Server(MessageId),
}

impl EntryKey {
    fn of(entry: &TranscriptEntry) -> Option<Self> {
        entry
            .local_key
            .map(Self::Local)
            .or_else(|| entry.message.identity.map(Self::Server))
    }
}

/// Turns successive transcript snapshots into printable lines.
#[derive(Debug)]
pub struct TranscriptPrinter {
    timestamp_format: String,
    shown: HashMap<EntryKey, DeliveryState>,
}

impl TranscriptPrinter {
    /// Creates a printer using a chrono format string for timestamps.
    #[must_use]
    pub fn new(timestamp_format: impl Into<String>) -> Self {
        Self {
            timestamp_format: timestamp_format.into(),
            shown: HashMap::new(),
        }
    }

    /// Lines for entries not shown before or whose state changed.
    ///
    /// An empty snapshot (a cleared session) resets the printer.
    pub fn update(&mut self, entries: &[TranscriptEntry]) -> Vec<String> {
        if entries.is_empty() {
            self.shown.clear();
            return Vec::new();
        }

        let mut lines = Vec::new();
        for entry in entries {
            let Some(key) = EntryKey::of(entry) else {
                continue;
            };
            if self.shown.get(&key) == Some(&entry.state) {
                continue;
            }
            self.shown.insert(key, entry.state.clone());
            lines.push(self.line(entry));
        }
        lines
    }

    fn line(&self, entry: &TranscriptEntry) -> String {
        let time = format_timestamp(entry.message.timestamp, &self.timestamp_format);
        let author = match entry.message.origin {
            Origin::LocalUser => "you",
            Origin::System => "*",
            Origin::RemotePeer => entry.message.author_label.as_deref().unwrap_or("them"),
        };
        let marker = match &entry.state {
            DeliveryState::Pending => " (sending)".to_string(),
            DeliveryState::Confirmed => String::new(),
            DeliveryState::Failed(reason) => format!(" (failed: {reason})"),
        };
        format!("[{time}] {author}: {}{marker}", entry.message.body)
    }
}

/// Formats a timestamp in local time.
///
/// Falls back to `??:??` for out-of-range values or an invalid format
/// string.
#[must_use]
pub fn format_timestamp(timestamp: Timestamp, format: &str) -> String {
    use chrono::{Local, TimeZone};

    let ms = timestamp.as_millis();
    let Ok(secs) = i64::try_from(ms / 1000) else {
        return "??:??".to_string();
    };
    let nsecs = u32::try_from((ms % 1000) * 1_000_000).unwrap_or(0);
    match Local.timestamp_opt(secs, nsecs) {
        chrono::LocalResult::Single(dt) => {
            let mut out = String::new();
            if write!(out, "{}", dt.format(format)).is_err() {
                return "??:??".to_string();
            }
            out
        }
        _ => "??:??".to_string(),
    }
}
