//! FrameAnalysisLoop driver.
//!
//! One thread of control per session: fetch a frame, analyse it, hand the result to
//! the sink, repeat. Fetching is the only place the loop waits. The source is
//! released on every exit path, including cancellation and detector loss.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::session::AnalysisSession;
use crate::detect::{DetectorBackend, DetectorStatus};
use crate::error::AnalysisError;
use crate::ingest::{FrameSource, SourceKind};
use crate::sink::PresentationSink;

const DEFAULT_DECODE_FAILURE_LIMIT: u32 = 30;
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Cooperative cancellation flag shared with signal handlers or UI threads.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why the loop ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopOutcome {
    /// A bounded source ran out of frames.
    Exhausted,
    /// The stop signal was raised.
    Cancelled,
    /// The detector became unavailable mid-session.
    DetectorLost(String),
    /// The source failed to connect, broke, or a live feed kept producing
    /// undecodable frames.
    SourceFailed(String),
}

#[derive(Clone, Debug)]
pub struct LoopReport {
    pub outcome: LoopOutcome,
    /// Frames pulled from the source, decodable or not.
    pub frames_delivered: u64,
    pub decode_failures: u64,
    pub sink_failures: u64,
}

pub struct FrameAnalysisLoop<'s, B: DetectorBackend> {
    session: &'s mut AnalysisSession<B>,
    stop: StopSignal,
    decode_failure_limit: u32,
}

impl<'s, B: DetectorBackend> FrameAnalysisLoop<'s, B> {
    pub fn new(session: &'s mut AnalysisSession<B>, stop: StopSignal) -> Self {
        Self {
            session,
            stop,
            decode_failure_limit: DEFAULT_DECODE_FAILURE_LIMIT,
        }
    }

    /// Consecutive undecodable frames tolerated before a live source is declared
    /// broken. Bounded sources skip bad frames until they run out.
    pub fn with_decode_failure_limit(mut self, limit: u32) -> Self {
        self.decode_failure_limit = limit.max(1);
        self
    }

    /// Drive `source` until it is exhausted, cancelled, or broken.
    pub fn run(&mut self, source: &mut FrameSource, sink: &mut dyn PresentationSink) -> LoopReport {
        let mut guard = ReleaseOnDrop(source);
        let mut report = LoopReport {
            outcome: LoopOutcome::Exhausted,
            frames_delivered: 0,
            decode_failures: 0,
            sink_failures: 0,
        };

        sink.detector_status(&self.session.detector_status());
        if let Err(err) = guard.0.connect() {
            log::error!("loop: source failed to connect: {}", err);
            report.outcome = LoopOutcome::SourceFailed(err.to_string());
            return report;
        }

        let mut consecutive_decode_failures = 0u32;
        let mut last_health_log = Instant::now();

        let outcome = loop {
            if self.stop.is_stopped() {
                log::info!("loop: stop requested");
                break LoopOutcome::Cancelled;
            }

            let frame = match guard.0.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break LoopOutcome::Exhausted,
                Err(err) if err.is_per_frame() => {
                    report.frames_delivered += 1;
                    report.decode_failures += 1;
                    consecutive_decode_failures += 1;
                    self.session.record_skipped();
                    log::debug!("loop: skipping frame: {}", err);
                    if guard.0.kind() == SourceKind::Live
                        && consecutive_decode_failures >= self.decode_failure_limit
                    {
                        break LoopOutcome::SourceFailed(format!(
                            "{} consecutive undecodable frames",
                            consecutive_decode_failures
                        ));
                    }
                    continue;
                }
                Err(err) => {
                    log::error!("loop: source failed: {}", err);
                    break LoopOutcome::SourceFailed(err.to_string());
                }
            };
            report.frames_delivered += 1;
            consecutive_decode_failures = 0;

            match self.session.process_frame(&frame) {
                Ok(analysis) => {
                    if let Err(err) = sink.present(&analysis) {
                        report.sink_failures += 1;
                        log::warn!("loop: sink dropped frame {}: {}", frame.index, err);
                    }
                }
                Err(AnalysisError::ModelUnavailable(reason)) => {
                    sink.detector_status(&DetectorStatus::Offline {
                        reason: reason.clone(),
                    });
                    break LoopOutcome::DetectorLost(reason);
                }
                Err(err) => log::debug!("loop: frame {} not analysed: {}", frame.index, err),
            }

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let stats = self.session.stats();
                log::info!(
                    "loop: source health={} delivered={} processed={} skipped={} peak={}",
                    guard.0.is_healthy(),
                    report.frames_delivered,
                    stats.frames_processed,
                    stats.frames_skipped,
                    stats.peak_count
                );
                last_health_log = Instant::now();
            }
        };
        report.outcome = outcome;

        log::info!(
            "loop: finished ({:?}) after {} frames",
            report.outcome,
            report.frames_delivered
        );
        report
    }
}

/// Releases the capture resource however the loop exits.
struct ReleaseOnDrop<'a>(&'a mut FrameSource);

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}
