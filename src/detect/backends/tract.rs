#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{DefectClass, Detection, DetectionResult};
use crate::error::AnalysisError;
use crate::frame::Frame;

/// Tract-based backend for YOLO-style ONNX detectors.
///
/// Expects a single input `[1, 3, size, size]` (RGB, 0..1) and a single output
/// `[1, 4 + classes, candidates]` with center-format boxes in input pixels.
/// Frames of any size are resampled to the model input before inference.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} ({}x{} input)",
            model_path.display(),
            input_size,
            input_size
        );

        Ok(Self {
            model,
            input_size,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Override the default NMS overlap threshold.
    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let input = frame.resized(self.input_size, self.input_size);
        let size = self.input_size as usize;
        let pixels = input.pixels();
        tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, channel, y, x)| {
            let idx = (y * size + x) * 3 + channel;
            pixels[idx] as f32 / 255.0
        })
        .into_tensor()
    }

    fn run(&self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }

        let attributes = shape[1];
        let candidates = shape[2];
        let scale = self.input_size as f32;
        let mut boxes = Vec::new();
        for i in 0..candidates {
            let (class_id, score) = (4..attributes)
                .map(|a| (a - 4, view[[0, a, i]]))
                .fold((0usize, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < self.confidence_threshold {
                continue;
            }
            let cx = view[[0, 0, i]] / scale;
            let cy = view[[0, 1, i]] / scale;
            let w = view[[0, 2, i]] / scale;
            let h = view[[0, 3, i]] / scale;
            boxes.push(Detection {
                x: (cx - w / 2.0).clamp(0.0, 1.0),
                y: (cy - h / 2.0).clamp(0.0, 1.0),
                w: w.clamp(0.0, 1.0),
                h: h.clamp(0.0, 1.0),
                confidence: score,
                class: if class_id == 0 {
                    DefectClass::Pothole
                } else {
                    DefectClass::Unknown
                },
            });
        }

        Ok(non_max_suppression(boxes, self.iou_threshold))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult, AnalysisError> {
        self.run(frame)
            .map(DetectionResult::new)
            .map_err(|e| AnalysisError::Inference(format!("{:#}", e)))
    }

    fn warm_up(&mut self) -> Result<(), AnalysisError> {
        let size = self.input_size;
        let blank = Frame::new(vec![0u8; (size * size * 3) as usize], size, size, 0)?;
        self.run(&blank)
            .map(|_| ())
            .map_err(|e| AnalysisError::ModelUnavailable(format!("warm-up failed: {:#}", e)))
    }
}

fn non_max_suppression(mut boxes: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if kept
            .iter()
            .all(|k| k.class != candidate.class || iou(k, &candidate) <= iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let ix = (a.x + a.w).min(b.x + b.w) - a.x.max(b.x);
    let iy = (a.y + a.h).min(b.y + b.h) - a.y.max(b.y);
    if ix <= 0.0 || iy <= 0.0 {
        return 0.0;
    }
    let inter = ix * iy;
    let union = a.w * a.h + b.w * b.h - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}
