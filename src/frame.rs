//! Frame container.
//!
//! - `Frame`: an RGB24 pixel grid (height x width x 3) plus its position in the stream.
//!
//! Frames are produced by the ingestion layer, consumed once by the analysis loop,
//! and then either dropped or forwarded to a presentation sink as annotated output.
//! Construction validates the buffer length, so every `Frame` in flight is decodable.

use image::{imageops::FilterType, RgbImage};
use std::time::SystemTime;

use crate::error::AnalysisError;

/// Bytes per pixel for every frame in the pipeline.
pub const CHANNELS: usize = 3;

/// Immutable RGB24 frame.
///
/// Pixel data is row-major, 3 bytes per pixel. `index` is 1-based and counts frames
/// delivered by the originating source (decode failures still consume an index).
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    /// Position in the originating stream.
    pub index: u64,
    /// Wall-clock time the source produced this frame.
    pub captured_at: SystemTime,
}

impl Frame {
    /// Wrap a raw RGB24 buffer. Fails with `FrameDecode` on zero dimensions or a
    /// length mismatch.
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self, AnalysisError> {
        if width == 0 || height == 0 {
            return Err(AnalysisError::FrameDecode(format!(
                "frame {} has empty dimensions {}x{}",
                index, width, height
            )));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(CHANNELS))
            .ok_or_else(|| AnalysisError::FrameDecode("frame dimensions overflow".into()))?;
        if data.len() != expected {
            return Err(AnalysisError::FrameDecode(format!(
                "frame {} length mismatch: expected {}, got {}",
                index,
                expected,
                data.len()
            )));
        }
        let image = RgbImage::from_raw(width, height, data).ok_or_else(|| {
            AnalysisError::FrameDecode(format!("frame {} rejected by image buffer", index))
        })?;
        Ok(Self::from_image(image, index))
    }

    /// Wrap an already decoded RGB image.
    pub fn from_image(image: RgbImage, index: u64) -> Self {
        Self {
            image,
            index,
            captured_at: SystemTime::now(),
        }
    }

    /// Decode an encoded still (JPEG / PNG) into a frame.
    pub fn decode(bytes: &[u8], index: u64) -> Result<Self, AnalysisError> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| AnalysisError::FrameDecode(format!("frame {}: {}", index, e)))?;
        let rgb = decoded.to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(AnalysisError::FrameDecode(format!(
                "frame {} decoded to an empty image",
                index
            )));
        }
        Ok(Self::from_image(rgb, index))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Read-only pixel bytes.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub(crate) fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Resampled copy at the given resolution. Aspect ratio is not preserved.
    ///
    /// Returns a plain clone when the size already matches.
    pub fn resized(&self, width: u32, height: u32) -> Frame {
        if self.dimensions() == (width.max(1), height.max(1)) {
            return self.clone();
        }
        let image = image::imageops::resize(
            &self.image,
            width.max(1),
            height.max(1),
            FilterType::Triangle,
        );
        Frame {
            image,
            index: self.index,
            captured_at: self.captured_at,
        }
    }

    /// Mean BT.601 luma over a pixel rectangle. Returns `None` for empty rectangles.
    pub(crate) fn mean_luma(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> Option<f32> {
        let x1 = x1.min(self.width());
        let y1 = y1.min(self.height());
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        let mut total = 0.0f64;
        for y in y0..y1 {
            for x in x0..x1 {
                let [r, g, b] = self.image.get_pixel(x, y).0;
                total += 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
            }
        }
        let count = ((x1 - x0) as f64) * ((y1 - y0) as f64);
        Some((total / count) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_validates_buffer_length() {
        assert!(Frame::new(vec![0u8; 12], 2, 2, 1).is_ok());
        let err = Frame::new(vec![0u8; 11], 2, 2, 1).unwrap_err();
        assert!(matches!(err, AnalysisError::FrameDecode(_)));
    }

    #[test]
    fn new_rejects_empty_dimensions() {
        let err = Frame::new(Vec::new(), 0, 4, 7).unwrap_err();
        assert!(matches!(err, AnalysisError::FrameDecode(_)));
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = Frame::decode(b"definitely not a jpeg", 3).unwrap_err();
        assert!(matches!(err, AnalysisError::FrameDecode(_)));
    }

    #[test]
    fn decode_reads_png() -> anyhow::Result<()> {
        let image = RgbImage::from_pixel(4, 3, image::Rgb([10, 20, 30]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image.write_to(&mut bytes, image::ImageFormat::Png)?;

        let frame = Frame::decode(bytes.get_ref(), 5)?;
        assert_eq!(frame.dimensions(), (4, 3));
        assert_eq!(frame.index, 5);
        assert_eq!(&frame.pixels()[..3], &[10, 20, 30]);
        Ok(())
    }

    #[test]
    fn resized_keeps_index_and_changes_size() {
        let frame = Frame::new(vec![128u8; 8 * 6 * 3], 8, 6, 9).unwrap();
        let small = frame.resized(4, 4);
        assert_eq!(small.dimensions(), (4, 4));
        assert_eq!(small.index, 9);
        assert_eq!(small.pixels().len(), 4 * 4 * 3);
    }

    #[test]
    fn mean_luma_of_uniform_patch() {
        let frame = Frame::new(vec![100u8; 4 * 4 * 3], 4, 4, 1).unwrap();
        let luma = frame.mean_luma(0, 0, 2, 2).unwrap();
        assert!((luma - 100.0).abs() < 0.01);
        assert!(frame.mean_luma(3, 3, 3, 4).is_none());
    }
}
