use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use super::reconciler::TranscriptEntry;

/// Summary of the conversation so far.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationStats {
    pub entries: usize,
    pub sources: usize,
    pub duration_secs: f64,
}

/// Shared, time-windowed log of finalized entries from all active
/// sessions.
///
/// Insertion order is meaningful; pruning is wall-clock based and runs
/// before every analysis read, so the buffer never grows unbounded.
pub struct ConversationBuffer {
    entries: VecDeque<TranscriptEntry>,
}

impl ConversationBuffer {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Append one finalized entry in arrival order.
    pub fn append(&mut self, entry: TranscriptEntry) {
        self.entries.push_back(entry);
    }

    /// Evict entries whose wall-clock age exceeds the window.
    pub fn prune_older_than(&mut self, window: Duration) {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
        self.entries.retain(|entry| entry.timestamp >= cutoff);
    }

    /// The most recent `max_entries` entries, in chronological order.
    pub fn snapshot(&self, max_entries: usize) -> Vec<TranscriptEntry> {
        let skip = self.entries.len().saturating_sub(max_entries);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn entries(&self) -> Vec<TranscriptEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> ConversationStats {
        let sources: BTreeSet<&str> = self
            .entries
            .iter()
            .map(|entry| entry.source.label())
            .collect();

        let duration_secs = match (self.entries.front(), self.entries.back()) {
            (Some(first), Some(last)) => {
                (last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0
            }
            _ => 0.0,
        };

        ConversationStats {
            entries: self.entries.len(),
            sources: sources.len(),
            duration_secs,
        }
    }

    /// Plain-text export, one source-tagged line per entry.
    pub fn export_text(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!(
                "[{}] [{}]: {}\n",
                entry.timestamp.format("%H:%M:%S"),
                entry.source.label(),
                entry.text
            ));
        }
        out
    }
}

impl Default for ConversationBuffer {
    fn default() -> Self {
        Self::new()
    }
}
