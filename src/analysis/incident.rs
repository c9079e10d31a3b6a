use std::collections::VecDeque;
use std::fmt;
use std::time::SystemTime;

use chrono::{DateTime, Local};

use crate::ingest::SourceKind;

/// One frame with at least one detection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncidentEntry {
    /// Position in the originating stream.
    pub frame_index: u64,
    pub count: u32,
    pub origin: SourceKind,
    pub recorded_at: SystemTime,
}

impl IncidentEntry {
    /// Local wall-clock `HH:MM:SS` of the moment the entry was recorded.
    pub fn clock_label(&self) -> String {
        DateTime::<Local>::from(self.recorded_at)
            .format("%H:%M:%S")
            .to_string()
    }
}

impl fmt::Display for IncidentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            SourceKind::Image => write!(f, "{} - Image: {} detected", self.clock_label(), self.count),
            SourceKind::Video | SourceKind::Live => write!(
                f,
                "{} - Frame {}: {} anomalies identified",
                self.clock_label(),
                self.frame_index,
                self.count
            ),
        }
    }
}

/// Append-only, arrival-ordered incident log with a hard capacity.
///
/// When full, the oldest entry is evicted. `total_recorded` keeps counting
/// evicted entries so callers can still tell how many incidents a session saw.
#[derive(Clone, Debug)]
pub struct IncidentLog {
    entries: VecDeque<IncidentEntry>,
    capacity: usize,
    total_recorded: u64,
}

impl IncidentLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            total_recorded: 0,
        }
    }

    pub fn push(&mut self, entry: IncidentEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        self.total_recorded += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries ever recorded, including evicted ones.
    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    pub fn latest(&self) -> Option<&IncidentEntry> {
        self.entries.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &IncidentEntry> + '_ {
        self.entries.iter()
    }

    /// Most recent first, the way session history is shown.
    pub fn recent_first(&self) -> impl Iterator<Item = &IncidentEntry> + '_ {
        self.entries.iter().rev()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_recorded = 0;
    }
}
