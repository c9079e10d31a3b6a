//! Error taxonomy for the analysis loop.
//!
//! Per-frame failures (`FrameDecode`, `Inference`, `SinkUnavailable`) are contained
//! inside one loop iteration. Only `ModelUnavailable` stops a session, and it stops
//! it gracefully: the loop reports a `DetectorLost` outcome instead of propagating.
//!
//! Source exhaustion is not an error; sources return `Ok(None)`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// The detector could not be initialised, or went away mid-session.
    #[error("detector unavailable: {0}")]
    ModelUnavailable(String),

    /// A single frame could not be decoded into an RGB pixel grid.
    #[error("frame decode failed: {0}")]
    FrameDecode(String),

    /// The detector rejected or failed on a single frame.
    #[error("inference failed: {0}")]
    Inference(String),

    /// The presentation sink could not accept an update.
    #[error("presentation sink unavailable: {0}")]
    SinkUnavailable(String),

    /// The frame source failed in a way that ends the stream.
    #[error("frame source failed: {0}")]
    Source(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AnalysisError {
    /// True when the failure is scoped to one frame and the loop should move on.
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            AnalysisError::FrameDecode(_)
                | AnalysisError::Inference(_)
                | AnalysisError::SinkUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_frame_classification() {
        assert!(AnalysisError::FrameDecode("bad".into()).is_per_frame());
        assert!(AnalysisError::Inference("bad".into()).is_per_frame());
        assert!(AnalysisError::SinkUnavailable("full".into()).is_per_frame());
        assert!(!AnalysisError::ModelUnavailable("gone".into()).is_per_frame());
        assert!(!AnalysisError::Source("eof".into()).is_per_frame());
    }
}
