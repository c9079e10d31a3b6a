use std::time::SystemTime;

use super::incident::{IncidentEntry, IncidentLog};
use crate::ingest::SourceKind;

/// Per-session counters and incident log, updated once per processed frame.
///
/// `peak_count` is the running maximum of every `current_count` seen since the
/// last reset. The incident log grows only for frames with detections.
#[derive(Clone, Debug)]
pub struct RollingStats {
    pub current_count: u32,
    pub peak_count: u32,
    /// Frames that reached the detector and updated the counters.
    pub frames_processed: u64,
    /// Frames dropped by decode or inference failures.
    pub frames_skipped: u64,
    incident_log: IncidentLog,
}

impl RollingStats {
    pub fn new(incident_capacity: usize) -> Self {
        Self {
            current_count: 0,
            peak_count: 0,
            frames_processed: 0,
            frames_skipped: 0,
            incident_log: IncidentLog::with_capacity(incident_capacity),
        }
    }

    /// Apply one frame's detection count. Returns the new log entry, if any.
    pub fn record(
        &mut self,
        frame_index: u64,
        origin: SourceKind,
        count: u32,
        recorded_at: SystemTime,
    ) -> Option<IncidentEntry> {
        self.current_count = count;
        self.peak_count = self.peak_count.max(count);
        self.frames_processed += 1;

        if count == 0 {
            return None;
        }
        let entry = IncidentEntry {
            frame_index,
            count,
            origin,
            recorded_at,
        };
        self.incident_log.push(entry.clone());
        Some(entry)
    }

    pub fn record_skip(&mut self) {
        self.frames_skipped += 1;
    }

    pub fn incident_log(&self) -> &IncidentLog {
        &self.incident_log
    }

    pub fn reset(&mut self) {
        self.current_count = 0;
        self.peak_count = 0;
        self.frames_processed = 0;
        self.frames_skipped = 0;
        self.incident_log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn patrol_sequence_accumulates() {
        let mut stats = RollingStats::new(100);
        let counts = [0u32, 1, 0, 6, 2, 0, 0, 0, 0, 1];
        for (i, count) in counts.iter().enumerate() {
            stats.record(i as u64 + 1, SourceKind::Video, *count, SystemTime::now());
        }
        assert_eq!(stats.peak_count, 6);
        assert_eq!(stats.current_count, 1);
        assert_eq!(stats.frames_processed, 10);
        let frames: Vec<u64> = stats.incident_log().iter().map(|e| e.frame_index).collect();
        assert_eq!(frames, vec![2, 4, 5, 10]);
    }

    #[test]
    fn zero_count_frames_do_not_log() {
        let mut stats = RollingStats::new(4);
        assert!(stats
            .record(1, SourceKind::Live, 0, SystemTime::now())
            .is_none());
        assert!(stats.incident_log().is_empty());
    }

    #[test]
    fn reset_clears_everything() {
        let mut stats = RollingStats::new(4);
        stats.record(1, SourceKind::Video, 3, SystemTime::now());
        stats.record_skip();
        stats.reset();
        assert_eq!(stats.peak_count, 0);
        assert_eq!(stats.current_count, 0);
        assert_eq!(stats.frames_skipped, 0);
        assert!(stats.incident_log().is_empty());
    }

    proptest! {
        #[test]
        fn peak_is_running_max(counts in proptest::collection::vec(0u32..20, 0..64)) {
            let mut stats = RollingStats::new(1_000);
            let mut previous_peak = 0;
            for (i, count) in counts.iter().enumerate() {
                stats.record(i as u64 + 1, SourceKind::Video, *count, SystemTime::now());
                prop_assert_eq!(stats.current_count, *count);
                prop_assert!(stats.peak_count >= previous_peak);
                prop_assert_eq!(stats.peak_count, counts[..=i].iter().copied().max().unwrap_or(0));
                previous_peak = stats.peak_count;
            }
        }

        #[test]
        fn log_tracks_nonzero_frames_in_order(counts in proptest::collection::vec(0u32..4, 0..64)) {
            let mut stats = RollingStats::new(1_000);
            for (i, count) in counts.iter().enumerate() {
                stats.record(i as u64 + 1, SourceKind::Video, *count, SystemTime::now());
            }
            let expected: Vec<u64> = counts
                .iter()
                .enumerate()
                .filter(|(_, c)| **c > 0)
                .map(|(i, _)| i as u64 + 1)
                .collect();
            let logged: Vec<u64> = stats.incident_log().iter().map(|e| e.frame_index).collect();
            prop_assert_eq!(logged, expected);
        }
    }
}
