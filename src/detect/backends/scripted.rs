use std::collections::VecDeque;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{DefectClass, Detection, DetectionResult};
use crate::error::AnalysisError;
use crate::frame::Frame;

/// What a scripted backend does once its script runs out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptEnd {
    /// Report zero detections for every further frame.
    Quiet,
    /// Start the script over.
    Repeat,
    /// Report the model as unavailable (simulates losing the inference engine).
    Unavailable,
}

/// Backend that replays a fixed list of per-frame detection counts.
///
/// Used for demos and for exercising the loop against known count sequences.
pub struct ScriptedBackend {
    script: Vec<usize>,
    pending: VecDeque<usize>,
    end: ScriptEnd,
    calls: u64,
}

impl ScriptedBackend {
    pub fn new(script: Vec<usize>) -> Self {
        Self {
            pending: script.iter().copied().collect(),
            script,
            end: ScriptEnd::Quiet,
            calls: 0,
        }
    }

    pub fn with_end(mut self, end: ScriptEnd) -> Self {
        self.end = end;
        self
    }

    /// Number of `detect` calls made so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn next_count(&mut self) -> Result<usize, AnalysisError> {
        if let Some(count) = self.pending.pop_front() {
            return Ok(count);
        }
        match self.end {
            ScriptEnd::Quiet => Ok(0),
            ScriptEnd::Repeat if !self.script.is_empty() => {
                self.pending = self.script.iter().copied().collect();
                Ok(self.pending.pop_front().unwrap_or(0))
            }
            ScriptEnd::Repeat => Ok(0),
            ScriptEnd::Unavailable => Err(AnalysisError::ModelUnavailable(
                "scripted detector exhausted".to_string(),
            )),
        }
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<DetectionResult, AnalysisError> {
        self.calls += 1;
        let count = self.next_count()?;
        Ok(DetectionResult::new(layout_boxes(count)))
    }
}

/// Lay `count` small boxes out left-to-right, top-to-bottom.
fn layout_boxes(count: usize) -> Vec<Detection> {
    let per_row = 10usize;
    (0..count)
        .map(|i| {
            let col = (i % per_row) as f32;
            let row = ((i / per_row) % per_row) as f32;
            Detection {
                x: 0.02 + col * 0.098,
                y: 0.02 + row * 0.098,
                w: 0.06,
                h: 0.06,
                confidence: 0.8,
                class: DefectClass::Pothole,
            }
        })
        .collect()
}
