//! Bounded video sources.
//!
//! This module provides `FileSource` for frames that come from an uploaded
//! recording. Backends:
//! - `stub://` synthetic patrol footage (tests, demos)
//! - a directory of still images, or in-memory encoded frames, played in order
//! - a video container decoded with FFmpeg (feature: ingest-file-ffmpeg)
//!
//! Every backend signals the end of the recording with `Ok(None)`. A frame that
//! cannot be decoded is reported as `FrameDecode` and the stream carries on.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::synthetic::{synthetic_frame, StubUrl};
use super::SourceStats;
use crate::error::AnalysisError;
use crate::frame::Frame;

const SEQUENCE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Configuration for a local video source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local path: a video file, an image directory, or `stub://name`.
    pub path: String,
    /// Nominal frame rate of the recording. Informational only: playback runs
    /// as fast as frames decode.
    pub target_fps: u32,
    /// Synthetic frame size.
    pub width: u32,
    pub height: u32,
    /// Synthetic stream length unless the stub URL overrides it.
    pub synthetic_frames: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            target_fps: 10,
            width: 640,
            height: 480,
            synthetic_frames: 50,
        }
    }
}

/// Local video source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    Sequence(SequenceSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self, AnalysisError> {
        if !is_local_file_path(&config.path) {
            return Err(AnalysisError::Source(
                "video ingestion only supports local paths (no URL schemes)".to_string(),
            ));
        }
        if let Some(url) = StubUrl::parse(&config.path) {
            return Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::new(config, url)),
            });
        }
        let path = PathBuf::from(&config.path);
        if path.is_dir() {
            return Ok(Self {
                backend: FileBackend::Sequence(SequenceSource::from_dir(&path)?),
            });
        }
        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            Ok(Self {
                backend: FileBackend::Ffmpeg(
                    FfmpegFileSource::new(config)
                        .map_err(|e| AnalysisError::Source(format!("{:#}", e)))?,
                ),
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(AnalysisError::Source(
                "video container decoding requires the ingest-file-ffmpeg feature".to_string(),
            ))
        }
    }

    /// Play a list of encoded stills (JPEG / PNG) as a recording.
    pub fn from_encoded(frames: Vec<Vec<u8>>) -> Self {
        Self {
            backend: FileBackend::Sequence(SequenceSource::from_encoded(frames)),
        }
    }

    /// Connect to the file source.
    pub fn connect(&mut self) -> Result<(), AnalysisError> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            FileBackend::Sequence(source) => source.connect(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    /// Decode the next frame. `Ok(None)` once the recording is exhausted.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, AnalysisError> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            FileBackend::Sequence(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    /// Close the underlying file or decoder.
    pub fn release(&mut self) {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.release(),
            FileBackend::Sequence(source) => source.release(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.release(),
        }
    }

    /// Check if the source is healthy.
    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            FileBackend::Synthetic(_) => true,
            FileBackend::Sequence(source) => source.is_healthy(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.is_healthy(),
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> SourceStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            FileBackend::Sequence(source) => source.stats(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    config: FileConfig,
    url: StubUrl,
    total_frames: u64,
    frame_count: u64,
    released: bool,
}

impl SyntheticFileSource {
    fn new(config: FileConfig, url: StubUrl) -> Self {
        Self {
            total_frames: url.frames.unwrap_or(config.synthetic_frames),
            config,
            url,
            frame_count: 0,
            released: false,
        }
    }

    fn connect(&mut self) -> Result<(), AnalysisError> {
        log::info!(
            "FileSource: connected to {} (synthetic, {} frames)",
            self.config.path,
            self.total_frames
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, AnalysisError> {
        if self.released || self.frame_count >= self.total_frames {
            return Ok(None);
        }
        self.frame_count += 1;
        synthetic_frame(&self.url, self.config.width, self.config.height, self.frame_count)
            .map(Some)
    }

    fn release(&mut self) {
        if !self.released {
            log::info!("FileSource: released {} (synthetic)", self.config.path);
        }
        self.released = true;
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_delivered: self.frame_count,
            decode_failures: 0,
            location: self.config.path.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Image sequence source (directory or in-memory stills)
// ----------------------------------------------------------------------------

enum EncodedFrame {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

struct SequenceSource {
    location: String,
    pending: VecDeque<EncodedFrame>,
    frame_count: u64,
    decode_failures: u64,
    last_failed: bool,
}

impl SequenceSource {
    fn from_dir(dir: &Path) -> Result<Self, AnalysisError> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            AnalysisError::Source(format!("failed to list {}: {}", dir.display(), e))
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_sequence_extension(path))
            .collect();
        paths.sort();
        if paths.is_empty() {
            return Err(AnalysisError::Source(format!(
                "{} contains no .jpg/.jpeg/.png frames",
                dir.display()
            )));
        }
        Ok(Self {
            location: dir.display().to_string(),
            pending: paths.into_iter().map(EncodedFrame::Path).collect(),
            frame_count: 0,
            decode_failures: 0,
            last_failed: false,
        })
    }

    fn from_encoded(frames: Vec<Vec<u8>>) -> Self {
        Self {
            location: "memory://upload".to_string(),
            pending: frames.into_iter().map(EncodedFrame::Bytes).collect(),
            frame_count: 0,
            decode_failures: 0,
            last_failed: false,
        }
    }

    fn connect(&mut self) -> Result<(), AnalysisError> {
        log::info!(
            "FileSource: connected to {} ({} stills)",
            self.location,
            self.pending.len()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, AnalysisError> {
        let Some(encoded) = self.pending.pop_front() else {
            return Ok(None);
        };
        self.frame_count += 1;
        let index = self.frame_count;
        let decoded = match encoded {
            EncodedFrame::Path(path) => std::fs::read(&path)
                .map_err(|e| {
                    AnalysisError::FrameDecode(format!("failed to read {}: {}", path.display(), e))
                })
                .and_then(|bytes| Frame::decode(&bytes, index)),
            EncodedFrame::Bytes(bytes) => Frame::decode(&bytes, index),
        };
        self.last_failed = decoded.is_err();
        if self.last_failed {
            self.decode_failures += 1;
        }
        decoded.map(Some)
    }

    fn release(&mut self) {
        if !self.pending.is_empty() {
            log::info!(
                "FileSource: released {} with {} stills unread",
                self.location,
                self.pending.len()
            );
        }
        self.pending.clear();
    }

    fn is_healthy(&self) -> bool {
        !self.last_failed
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_delivered: self.frame_count,
            decode_failures: self.decode_failures,
            location: self.location.clone(),
        }
    }
}

fn has_sequence_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SEQUENCE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
