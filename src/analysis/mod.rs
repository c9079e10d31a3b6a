//! Frame analysis core.
//!
//! Turns each incoming frame into an annotated frame, rolling statistics, and a
//! severity status.

mod incident;
mod runner;
mod session;
mod severity;
mod stats;

pub use incident::{IncidentEntry, IncidentLog};
pub use runner::{FrameAnalysisLoop, LoopOutcome, LoopReport, StopSignal};
pub use session::{AnalysisSession, FrameAnalysis, SessionSummary};
pub use severity::{SeverityStatus, SeverityThresholds};
pub use stats::RollingStats;
