//! Per-session analysis state.
//!
//! An `AnalysisSession` owns the detector and the `RollingStats` for one image,
//! video, or live run. It is created with `init`, cleared with `reset`, and closed
//! with `teardown`. Nothing here is global: two sessions never share counters.

use super::incident::IncidentEntry;
use super::severity::SeverityStatus;
use super::stats::RollingStats;
use crate::config::AnalysisSettings;
use crate::detect::{DetectorBackend, DetectorStatus};
use crate::error::AnalysisError;
use crate::frame::Frame;
use crate::ingest::SourceKind;

/// Everything the presentation layer needs for one processed frame.
#[derive(Clone, Debug)]
pub struct FrameAnalysis {
    pub annotated: Frame,
    pub current_count: u32,
    pub peak_count: u32,
    pub status: SeverityStatus,
    /// Present when this frame added an incident.
    pub new_entry: Option<IncidentEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum SessionState {
    Active,
    /// The detector went away mid-session; no further frames are sent to it.
    Degraded { reason: String },
}

/// Final numbers of a finished session.
#[derive(Clone, Debug)]
pub struct SessionSummary {
    pub kind: SourceKind,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub peak_count: u32,
    pub status: SeverityStatus,
    /// Retained incidents, most recent first.
    pub incidents: Vec<IncidentEntry>,
    /// Incidents recorded over the whole session, including evicted ones.
    pub total_incidents: u64,
    pub detector: DetectorStatus,
}

pub struct AnalysisSession<B: DetectorBackend = Box<dyn DetectorBackend>> {
    backend: B,
    kind: SourceKind,
    settings: AnalysisSettings,
    stats: RollingStats,
    state: SessionState,
}

impl<B: DetectorBackend> AnalysisSession<B> {
    /// Warm the detector up and open a fresh session.
    ///
    /// Fails with `Config` on inconsistent thresholds, and with `ModelUnavailable`
    /// when the detector cannot run. Either way no session exists and no frame is
    /// ever processed.
    pub fn init(
        mut backend: B,
        kind: SourceKind,
        settings: AnalysisSettings,
    ) -> Result<Self, AnalysisError> {
        settings
            .thresholds
            .validate()
            .map_err(|e| AnalysisError::Config(e.to_string()))?;
        if settings.resize_dim.is_some_and(|(w, h)| w == 0 || h == 0) {
            return Err(AnalysisError::Config(
                "resize dimensions must be non-zero".to_string(),
            ));
        }
        backend.warm_up().map_err(|e| match e {
            AnalysisError::ModelUnavailable(reason) => AnalysisError::ModelUnavailable(reason),
            other => AnalysisError::ModelUnavailable(other.to_string()),
        })?;
        log::info!(
            "session: {} analysis with {} detector (resize={:?}, thresholds={}/{})",
            kind,
            backend.name(),
            Self::resize_for(kind, &settings),
            settings.thresholds.low,
            settings.thresholds.high
        );
        Ok(Self {
            stats: RollingStats::new(settings.incident_capacity),
            backend,
            kind,
            settings,
            state: SessionState::Active,
        })
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn stats(&self) -> &RollingStats {
        &self.stats
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Status derived from the current peak count.
    pub fn status(&self) -> SeverityStatus {
        SeverityStatus::classify(self.stats.peak_count, &self.settings.thresholds)
    }

    pub fn detector_status(&self) -> DetectorStatus {
        match &self.state {
            SessionState::Active => DetectorStatus::Active {
                backend: self.backend.name(),
            },
            SessionState::Degraded { reason } => DetectorStatus::Offline {
                reason: reason.clone(),
            },
        }
    }

    /// Pre-inference resize for this session. Only live sessions trade aspect
    /// ratio for throughput.
    pub fn resize_dim(&self) -> Option<(u32, u32)> {
        Self::resize_for(self.kind, &self.settings)
    }

    fn resize_for(kind: SourceKind, settings: &AnalysisSettings) -> Option<(u32, u32)> {
        match kind {
            SourceKind::Live => settings.resize_dim,
            SourceKind::Image | SourceKind::Video => None,
        }
    }

    /// Run one frame through the detector and fold its count into the stats.
    ///
    /// On `Err` the counts and incident log are unchanged. `Inference` errors count
    /// the frame as skipped; `ModelUnavailable` degrades the session so later calls fail fast
    /// without touching the detector.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameAnalysis, AnalysisError> {
        if let SessionState::Degraded { reason } = &self.state {
            return Err(AnalysisError::ModelUnavailable(reason.clone()));
        }

        let (native_w, native_h) = frame.dimensions();
        let resized;
        let inference_frame = match self.resize_dim() {
            Some((w, h)) => {
                resized = frame.resized(w, h);
                &resized
            }
            None => frame,
        };

        let result = match self.backend.detect(inference_frame) {
            Ok(result) => result,
            Err(AnalysisError::ModelUnavailable(reason)) => {
                log::error!("session: detector lost at frame {}: {}", frame.index, reason);
                self.state = SessionState::Degraded {
                    reason: reason.clone(),
                };
                return Err(AnalysisError::ModelUnavailable(reason));
            }
            Err(err) => {
                log::debug!("session: skipping frame {}: {}", frame.index, err);
                self.stats.record_skip();
                return Err(err);
            }
        };

        let count = u32::try_from(result.count()).unwrap_or(u32::MAX);
        let annotated = result
            .render(inference_frame)
            .resized(native_w, native_h);
        let new_entry = self
            .stats
            .record(frame.index, self.kind, count, frame.captured_at);

        Ok(FrameAnalysis {
            annotated,
            current_count: count,
            peak_count: self.stats.peak_count,
            status: self.status(),
            new_entry,
        })
    }

    /// Account for a frame the source failed to decode.
    pub fn record_skipped(&mut self) {
        self.stats.record_skip();
    }

    /// Clear counters and incident history ("clear session logs").
    ///
    /// Takes `&mut self`, so it cannot race an in-flight `process_frame`.
    pub fn reset(&mut self) {
        log::info!("session: counters and incident log cleared");
        self.stats.reset();
    }

    /// Callback form for transports that push frames (`Frame -> Frame`).
    ///
    /// Returns the annotated frame, or the input unchanged when the frame could
    /// not be analysed. Cancellation is the transport no longer calling it.
    pub fn frame_callback(&mut self) -> impl FnMut(Frame) -> Frame + '_ {
        move |frame: Frame| match self.process_frame(&frame) {
            Ok(analysis) => analysis.annotated,
            Err(err) => {
                log::debug!("session: passing frame {} through: {}", frame.index, err);
                frame
            }
        }
    }

    /// Close the session and hand back its final numbers.
    pub fn teardown(self) -> SessionSummary {
        let summary = SessionSummary {
            kind: self.kind,
            frames_processed: self.stats.frames_processed,
            frames_skipped: self.stats.frames_skipped,
            peak_count: self.stats.peak_count,
            status: self.status(),
            incidents: self.stats.incident_log().recent_first().cloned().collect(),
            total_incidents: self.stats.incident_log().total_recorded(),
            detector: self.detector_status(),
        };
        log::info!(
            "session: {} closed: processed={} skipped={} peak={} status={} incidents={}",
            summary.kind,
            summary.frames_processed,
            summary.frames_skipped,
            summary.peak_count,
            summary.status,
            summary.total_incidents
        );
        summary
    }
}
