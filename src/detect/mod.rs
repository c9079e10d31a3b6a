//! Detector capability.
//!
//! The analysis loop treats the detector as an opaque collaborator: it hands over a
//! frame, gets back a `DetectionResult`, counts it, and asks it to render itself.
//! Backends are selected by name from configuration.

mod backend;
pub mod backends;
mod render;
mod result;

pub use backend::{DetectorBackend, DetectorStatus};
pub use backends::{ScriptEnd, ScriptedBackend, StubBackend};
pub use result::{DefectClass, Detection, DetectionResult};

use crate::config::DetectorSettings;
use crate::error::AnalysisError;

/// Backend names accepted by `load_backend`.
pub const KNOWN_BACKENDS: &[&str] = &["stub", "tract"];

/// Build the configured detector backend.
///
/// Any failure here is `ModelUnavailable`: the caller reports the detector as
/// offline and must not start a session.
pub fn load_backend(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>, AnalysisError> {
    match settings.backend.as_str() {
        "stub" => {
            log::info!("detector: stub backend (no model file)");
            Ok(Box::new(StubBackend::new()))
        }
        "tract" => load_tract(settings),
        other => Err(AnalysisError::ModelUnavailable(format!(
            "unknown detector backend '{}'",
            other
        ))),
    }
}

#[cfg(feature = "backend-tract")]
fn load_tract(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>, AnalysisError> {
    if !settings.model_path.exists() {
        return Err(AnalysisError::ModelUnavailable(format!(
            "model file {} not found",
            settings.model_path.display()
        )));
    }
    let backend = backends::TractBackend::new(&settings.model_path, settings.input_size)
        .map_err(|e| AnalysisError::ModelUnavailable(format!("{:#}", e)))?
        .with_threshold(settings.confidence_threshold)
        .with_iou_threshold(settings.iou_threshold);
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn load_tract(_settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>, AnalysisError> {
    Err(AnalysisError::ModelUnavailable(
        "tract backend requires the backend-tract feature".to_string(),
    ))
}
