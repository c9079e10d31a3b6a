//! Presentation sinks.
//!
//! A sink receives one `FrameAnalysis` per processed frame, in order. Sink failures
//! are reported as `SinkUnavailable`; the analysis loop logs them and moves on.

use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::{FrameAnalysis, SeverityStatus};
use crate::detect::DetectorStatus;
use crate::error::AnalysisError;

pub trait PresentationSink {
    /// Render one processed frame.
    fn present(&mut self, analysis: &FrameAnalysis) -> Result<(), AnalysisError>;

    /// Detector availability. Called once at loop start and again if the
    /// detector goes offline.
    fn detector_status(&mut self, _status: &DetectorStatus) {}
}

impl<S: PresentationSink + ?Sized> PresentationSink for Box<S> {
    fn present(&mut self, analysis: &FrameAnalysis) -> Result<(), AnalysisError> {
        (**self).present(analysis)
    }

    fn detector_status(&mut self, status: &DetectorStatus) {
        (**self).detector_status(status)
    }
}

/// Writes incidents and status changes to the log.
#[derive(Debug, Default)]
pub struct LogSink {
    last_status: Option<SeverityStatus>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresentationSink for LogSink {
    fn present(&mut self, analysis: &FrameAnalysis) -> Result<(), AnalysisError> {
        log::debug!(
            "frame {}: current={} peak={} status={}",
            analysis.annotated.index,
            analysis.current_count,
            analysis.peak_count,
            analysis.status
        );
        if let Some(entry) = &analysis.new_entry {
            log::info!("incident: {}", entry);
        }
        if self.last_status != Some(analysis.status) {
            log::info!(
                "status: {} ({})",
                analysis.status.headline(),
                analysis.status.advice()
            );
            self.last_status = Some(analysis.status);
        }
        Ok(())
    }

    fn detector_status(&mut self, status: &DetectorStatus) {
        if status.is_active() {
            log::info!("detector: {}", status);
        } else {
            log::warn!("detector: {}", status);
        }
    }
}

/// Saves every annotated frame as `frame_NNNNNN.jpg`.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    written: u64,
}

impl DirectorySink {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, AnalysisError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            AnalysisError::SinkUnavailable(format!("create {}: {}", dir.display(), e))
        })?;
        log::info!("DirectorySink: writing annotated frames to {}", dir.display());
        Ok(Self { dir, written: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{:06}.jpg", index))
    }
}

impl PresentationSink for DirectorySink {
    fn present(&mut self, analysis: &FrameAnalysis) -> Result<(), AnalysisError> {
        let path = self.frame_path(analysis.annotated.index);
        analysis
            .annotated
            .image()
            .save_with_format(&path, image::ImageFormat::Jpeg)
            .map_err(|e| AnalysisError::SinkUnavailable(format!("{}: {}", path.display(), e)))?;
        self.written += 1;
        Ok(())
    }
}

/// Forwards each update to several sinks. One failing sink does not starve the
/// others; the first failure is returned.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn PresentationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl PresentationSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn push(&mut self, sink: Box<dyn PresentationSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl PresentationSink for FanoutSink {
    fn present(&mut self, analysis: &FrameAnalysis) -> Result<(), AnalysisError> {
        let mut first_err = None;
        for sink in &mut self.sinks {
            if let Err(err) = sink.present(analysis) {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn detector_status(&mut self, status: &DetectorStatus) {
        for sink in &mut self.sinks {
            sink.detector_status(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn analysis(index: u64, count: u32) -> FrameAnalysis {
        FrameAnalysis {
            annotated: Frame::new(vec![90u8; 8 * 8 * 3], 8, 8, index).unwrap(),
            current_count: count,
            peak_count: count,
            status: SeverityStatus::Optimal,
            new_entry: None,
        }
    }

    struct Failing;

    impl PresentationSink for Failing {
        fn present(&mut self, _analysis: &FrameAnalysis) -> Result<(), AnalysisError> {
            Err(AnalysisError::SinkUnavailable("display closed".into()))
        }
    }

    struct Counting(Rc<RefCell<u32>>);

    impl PresentationSink for Counting {
        fn present(&mut self, _analysis: &FrameAnalysis) -> Result<(), AnalysisError> {
            *self.0.borrow_mut() += 1;
            Ok(())
        }
    }

    #[test]
    fn directory_sink_names_frames_by_index() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut sink = DirectorySink::create(dir.path().join("annotated"))?;
        sink.present(&analysis(7, 1))?;

        assert!(dir.path().join("annotated/frame_000007.jpg").is_file());
        assert_eq!(sink.frames_written(), 1);
        Ok(())
    }

    #[test]
    fn directory_sink_reports_unwritable_target() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut sink = DirectorySink::create(dir.path())?;
        fs::remove_dir_all(dir.path())?;

        let err = sink.present(&analysis(1, 0)).unwrap_err();
        assert!(matches!(err, AnalysisError::SinkUnavailable(_)));
        Ok(())
    }

    #[test]
    fn fanout_keeps_feeding_after_a_failure() {
        let seen = Rc::new(RefCell::new(0));
        let mut fanout = FanoutSink::new()
            .with(Failing)
            .with(Counting(Rc::clone(&seen)));

        assert!(fanout.present(&analysis(1, 2)).is_err());
        assert!(fanout.present(&analysis(2, 0)).is_err());
        assert_eq!(*seen.borrow(), 2);
        assert_eq!(fanout.len(), 2);
    }

    #[test]
    fn log_sink_accepts_everything() {
        let mut sink = LogSink::new();
        sink.detector_status(&DetectorStatus::Offline {
            reason: "model missing".into(),
        });
        assert!(sink.present(&analysis(1, 0)).is_ok());
    }
}
