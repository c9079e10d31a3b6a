use crate::detect::backend::DetectorBackend;
use crate::detect::result::{DefectClass, Detection, DetectionResult};
use crate::error::AnalysisError;
use crate::frame::Frame;

/// Grid resolution used by the stub detector (cells per side).
pub const GRID_SIZE: u32 = 8;

/// Cells darker than this mean luma are reported as defects.
pub const DARK_LUMA_THRESHOLD: f32 = 60.0;

/// Stub backend for development and tests. No model file required.
///
/// Splits the frame into a `GRID_SIZE` x `GRID_SIZE` grid and reports one defect per
/// cell whose mean luma falls below `DARK_LUMA_THRESHOLD`. Synthetic `stub://`
/// sources paint their defects on the same grid, so counts are exact.
#[derive(Default)]
pub struct StubBackend {
    frames_seen: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult, AnalysisError> {
        self.frames_seen += 1;
        let (width, height) = frame.dimensions();

        let mut detections = Vec::new();
        for row in 0..GRID_SIZE {
            for col in 0..GRID_SIZE {
                let (x0, y0, x1, y1) = cell_bounds(col, row, width, height);
                let Some(luma) = frame.mean_luma(x0, y0, x1, y1) else {
                    continue;
                };
                if luma >= DARK_LUMA_THRESHOLD {
                    continue;
                }
                detections.push(Detection {
                    x: x0 as f32 / width as f32,
                    y: y0 as f32 / height as f32,
                    w: (x1 - x0) as f32 / width as f32,
                    h: (y1 - y0) as f32 / height as f32,
                    confidence: 1.0 - luma / DARK_LUMA_THRESHOLD,
                    class: DefectClass::Pothole,
                });
            }
        }

        Ok(DetectionResult::new(detections))
    }
}

/// Pixel bounds `(x0, y0, x1, y1)` of a grid cell, end-exclusive.
pub(crate) fn cell_bounds(col: u32, row: u32, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let x0 = (col as u64 * width as u64 / GRID_SIZE as u64) as u32;
    let x1 = ((col as u64 + 1) * width as u64 / GRID_SIZE as u64) as u32;
    let y0 = (row as u64 * height as u64 / GRID_SIZE as u64) as u32;
    let y1 = ((row as u64 + 1) * height as u64 / GRID_SIZE as u64) as u32;
    (x0, y0, x1, y1)
}
