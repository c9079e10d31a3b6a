use std::fmt;

use crate::error::AnalysisError;
use crate::frame::Frame;

use super::result::DetectionResult;

/// Detector backend trait.
///
/// Backends are opaque: the analysis loop hands them a frame and counts what comes
/// back. A backend reports `AnalysisError::Inference` for a frame it cannot handle
/// and `AnalysisError::ModelUnavailable` once it can no longer run at all.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame. Boxes come back normalized to the frame.
    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult, AnalysisError>;

    /// Optional warm-up hook, run once before a session starts.
    fn warm_up(&mut self) -> Result<(), AnalysisError> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult, AnalysisError> {
        (**self).detect(frame)
    }

    fn warm_up(&mut self) -> Result<(), AnalysisError> {
        (**self).warm_up()
    }
}

/// Persistent detector health indicator shown once per run, not per frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectorStatus {
    Active { backend: &'static str },
    Offline { reason: String },
}

impl DetectorStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, DetectorStatus::Active { .. })
    }
}

impl fmt::Display for DetectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorStatus::Active { backend } => write!(f, "detector active ({})", backend),
            DetectorStatus::Offline { reason } => write!(f, "detector offline: {}", reason),
        }
    }
}
