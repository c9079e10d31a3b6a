//! Single still image source.
//!
//! Yields exactly one frame, then reports exhaustion. The image may come from a
//! local path, from in-memory upload bytes, or from a synthetic `stub://` scene.

use std::path::PathBuf;

use super::synthetic::{paint_road_scene, StubUrl};
use super::SourceStats;
use crate::error::AnalysisError;
use crate::frame::Frame;

enum ImageOrigin {
    Path(PathBuf),
    Bytes(Vec<u8>),
    Synthetic {
        url: StubUrl,
        width: u32,
        height: u32,
    },
}

pub struct ImageSource {
    origin: ImageOrigin,
    location: String,
    delivered: bool,
    decode_failures: u64,
}

impl ImageSource {
    /// Image from a local path, or a synthetic scene for `stub://` locations.
    pub fn open(location: &str, width: u32, height: u32) -> Result<Self, AnalysisError> {
        let origin = match StubUrl::parse(location) {
            Some(url) => ImageOrigin::Synthetic { url, width, height },
            None if location.contains("://") => {
                return Err(AnalysisError::Source(format!(
                    "image ingestion only supports local paths, got '{}'",
                    location
                )))
            }
            None if location.trim().is_empty() => {
                return Err(AnalysisError::Source("image path is empty".to_string()))
            }
            None => ImageOrigin::Path(PathBuf::from(location)),
        };
        Ok(Self {
            origin,
            location: location.to_string(),
            delivered: false,
            decode_failures: 0,
        })
    }

    /// Image from encoded upload bytes (JPEG / PNG).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            origin: ImageOrigin::Bytes(bytes),
            location: "memory://upload".to_string(),
            delivered: false,
            decode_failures: 0,
        }
    }

    pub fn connect(&mut self) -> Result<(), AnalysisError> {
        log::info!("ImageSource: ready ({})", self.location);
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>, AnalysisError> {
        if self.delivered {
            return Ok(None);
        }
        self.delivered = true;

        let decoded = match &self.origin {
            ImageOrigin::Path(path) => {
                let bytes = std::fs::read(path).map_err(|e| {
                    AnalysisError::Source(format!("failed to read {}: {}", path.display(), e))
                })?;
                Frame::decode(&bytes, 1)
            }
            ImageOrigin::Bytes(bytes) => Frame::decode(bytes, 1),
            ImageOrigin::Synthetic { url, width, height } => {
                paint_road_scene(*width, *height, url.defects_for(1), 1)
            }
        };
        if decoded.is_err() {
            self.decode_failures += 1;
        }
        decoded.map(Some)
    }

    /// Drops any held upload bytes.
    pub fn release(&mut self) {
        if let ImageOrigin::Bytes(bytes) = &mut self.origin {
            bytes.clear();
            bytes.shrink_to_fit();
        }
        self.delivered = true;
    }

    pub fn is_healthy(&self) -> bool {
        self.decode_failures == 0
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_delivered: u64::from(self.delivered),
            decode_failures: self.decode_failures,
            location: self.location.clone(),
        }
    }
}
