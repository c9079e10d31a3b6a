use crate::frame::Frame;

use super::render;

/// Result of running the detector on one frame.
///
/// The analysis loop only counts and draws detections; it never interprets
/// their fields beyond that.
#[derive(Clone, Debug, Default)]
pub struct DetectionResult {
    /// Bounding boxes in normalized 0..1 coordinates.
    pub detections: Vec<Detection>,
}

/// One located road defect.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    /// Left edge (normalized).
    pub x: f32,
    /// Top edge (normalized).
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
    pub class: DefectClass,
}

#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefectClass {
    Pothole,
    Unknown,
}

impl DefectClass {
    pub fn label(&self) -> &'static str {
        match self {
            DefectClass::Pothole => "pothole",
            DefectClass::Unknown => "defect",
        }
    }
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    /// Number of detections. This is the frame's `current_count`.
    pub fn count(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Annotated copy of `frame` with every detection drawn on it.
    pub fn render(&self, frame: &Frame) -> Frame {
        let mut annotated = frame.clone();
        for detection in &self.detections {
            render::draw_detection(&mut annotated, detection);
        }
        annotated
    }
}
