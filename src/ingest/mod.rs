//! Frame ingestion sources.
//!
//! This module provides the three sources an analysis session can draw from:
//! - a single still image (path, upload bytes, or synthetic)
//! - a bounded video (container file via FFmpeg, image-sequence directory, or synthetic)
//! - a live camera (V4L2 device, or a paced synthetic feed)
//!
//! Every source follows the same contract:
//! - `connect()` opens the underlying resource
//! - `next_frame()` returns `Ok(Some(frame))`, `Ok(None)` at end of stream,
//!   `Err(FrameDecode)` for a single undecodable frame, or another error when the
//!   source itself has failed
//! - `release()` closes the resource and may be called more than once
//!
//! `stub://name?defects=N&frames=M&corrupt=K` locations produce synthetic road scenes
//! without touching the filesystem or a device.

use std::fmt;

use crate::config::SourceSettings;
use crate::error::AnalysisError;
use crate::frame::Frame;

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod still;
pub mod live;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub(crate) mod synthetic;

pub use file::{FileConfig, FileSource};
pub use still::ImageSource;
pub use live::{LiveConfig, LiveSource};
pub use synthetic::PATROL_PATTERN;

/// Which kind of input a session analyses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Image,
    Video,
    Live,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Image => "image",
            SourceKind::Video => "video",
            SourceKind::Live => "live",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters shared by every source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_delivered: u64,
    pub decode_failures: u64,
    pub location: String,
}

/// A connected frame source of one of the three kinds.
pub enum FrameSource {
    Image(ImageSource),
    Video(FileSource),
    Live(LiveSource),
}

impl FrameSource {
    /// Open `location` as a source of the given kind.
    pub fn open(
        kind: SourceKind,
        location: &str,
        settings: &SourceSettings,
    ) -> Result<Self, AnalysisError> {
        match kind {
            SourceKind::Image => {
                ImageSource::open(location, settings.width, settings.height).map(Self::Image)
            }
            SourceKind::Video => FileSource::new(FileConfig {
                path: location.to_string(),
                target_fps: settings.target_fps,
                width: settings.width,
                height: settings.height,
                synthetic_frames: settings.synthetic_frames,
            })
            .map(Self::Video),
            SourceKind::Live => LiveSource::new(LiveConfig {
                device: location.to_string(),
                target_fps: settings.target_fps,
                width: settings.width,
                height: settings.height,
            })
            .map(Self::Live),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            FrameSource::Image(_) => SourceKind::Image,
            FrameSource::Video(_) => SourceKind::Video,
            FrameSource::Live(_) => SourceKind::Live,
        }
    }

    pub fn connect(&mut self) -> Result<(), AnalysisError> {
        match self {
            FrameSource::Image(source) => source.connect(),
            FrameSource::Video(source) => source.connect(),
            FrameSource::Live(source) => source.connect(),
        }
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>, AnalysisError> {
        match self {
            FrameSource::Image(source) => source.next_frame(),
            FrameSource::Video(source) => source.next_frame(),
            FrameSource::Live(source) => source.next_frame(),
        }
    }

    pub fn release(&mut self) {
        match self {
            FrameSource::Image(source) => source.release(),
            FrameSource::Video(source) => source.release(),
            FrameSource::Live(source) => source.release(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        match self {
            FrameSource::Image(source) => source.is_healthy(),
            FrameSource::Video(source) => source.is_healthy(),
            FrameSource::Live(source) => source.is_healthy(),
        }
    }

    pub fn stats(&self) -> SourceStats {
        match self {
            FrameSource::Image(source) => source.stats(),
            FrameSource::Video(source) => source.stats(),
            FrameSource::Live(source) => source.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SourceSettings {
        SourceSettings {
            target_fps: 0,
            width: 32,
            height: 24,
            synthetic_frames: 3,
            ..SourceSettings::default()
        }
    }

    #[test]
    fn open_dispatches_on_kind() -> anyhow::Result<()> {
        for kind in [SourceKind::Image, SourceKind::Video, SourceKind::Live] {
            let source = FrameSource::open(kind, "stub://road", &settings())?;
            assert_eq!(source.kind(), kind);
        }
        Ok(())
    }

    #[test]
    fn image_source_yields_once() -> anyhow::Result<()> {
        let mut source = FrameSource::open(SourceKind::Image, "stub://road", &settings())?;
        source.connect()?;
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn kind_display_is_lowercase() {
        assert_eq!(SourceKind::Video.to_string(), "video");
    }
}
