//! Pothole Guard
//!
//! Road-defect detection over still images, recorded video, and live cameras.
//!
//! # Architecture
//!
//! Every input runs through the same frame analysis loop:
//!
//! 1. **Ingest**: a `FrameSource` yields RGB frames (`Ok(None)` when a bounded source ends).
//! 2. **Detect**: a `DetectorBackend` returns bounding boxes for the frame.
//! 3. **Accumulate**: `RollingStats` tracks the current count, the session peak, and a
//!    bounded incident log.
//! 4. **Classify**: the peak count maps to a `SeverityStatus` (Optimal, Routine, Critical).
//! 5. **Present**: the annotated frame and the numbers go to a `PresentationSink`.
//!
//! A session owns its statistics exclusively. Per-frame failures (undecodable frame,
//! inference error, sink error) skip one frame; a detector that disappears ends the
//! session with a `DetectorLost` outcome instead of a panic or an error return.
//!
//! # Module Structure
//!
//! - `frame`: RGB frame container
//! - `ingest`: image, video, and live sources
//! - `detect`: detector trait, backends, box rendering
//! - `analysis`: severity policy, incident log, session, loop driver
//! - `sink`: presentation sinks
//! - `ui`: terminal stages and live telemetry
//! - `config`: layered configuration

pub mod analysis;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod sink;
pub mod ui;

pub use analysis::{
    AnalysisSession, FrameAnalysis, FrameAnalysisLoop, IncidentEntry, IncidentLog, LoopOutcome,
    LoopReport, RollingStats, SessionSummary, SeverityStatus, SeverityThresholds, StopSignal,
};
pub use config::{AnalysisSettings, DetectorSettings, GuardConfig, SourceSettings};
pub use detect::{
    load_backend, DefectClass, Detection, DetectionResult, DetectorBackend, DetectorStatus,
};
pub use error::AnalysisError;
pub use frame::Frame;
pub use ingest::{FrameSource, SourceKind, SourceStats};
pub use sink::{DirectorySink, FanoutSink, LogSink, PresentationSink};
