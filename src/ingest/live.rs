//! Live camera source.
//!
//! This module provides `LiveSource` for ingesting frames from a local camera.
//!
//! The live source is responsible for:
//! - Opening a device node (e.g., /dev/video0) and negotiating RGB capture
//! - Pacing synthetic `stub://` feeds at the configured frame rate
//! - Converting device pixel formats to RGB24 before handoff
//!
//! Live feeds do not end on their own. The analysis loop stops them through its
//! stop signal and then calls `release()`, which closes the device.

#[cfg(feature = "ingest-v4l2")]
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use super::synthetic::{synthetic_frame, StubUrl};
use super::SourceStats;
use crate::error::AnalysisError;
use crate::frame::Frame;

/// Configuration for a live camera source.
#[derive(Clone, Debug)]
pub struct LiveConfig {
    /// Device path (e.g., "/dev/video0") or `stub://name`.
    pub device: String,
    /// Target frame rate. 0 disables pacing for synthetic feeds.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// Live camera source.
///
/// Uses libv4l for real devices, with a synthetic fallback for `stub://` paths.
pub struct LiveSource {
    backend: LiveBackend,
}

enum LiveBackend {
    Synthetic(SyntheticLiveSource),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceLiveSource),
}

impl LiveSource {
    pub fn new(config: LiveConfig) -> Result<Self, AnalysisError> {
        if let Some(url) = StubUrl::parse(&config.device) {
            return Ok(Self {
                backend: LiveBackend::Synthetic(SyntheticLiveSource::new(config, url)),
            });
        }
        #[cfg(feature = "ingest-v4l2")]
        {
            Ok(Self {
                backend: LiveBackend::Device(DeviceLiveSource::new(config)),
            })
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            Err(AnalysisError::Source(format!(
                "camera {} requires the ingest-v4l2 feature",
                config.device
            )))
        }
    }

    /// Open the camera.
    pub fn connect(&mut self) -> Result<(), AnalysisError> {
        match &mut self.backend {
            LiveBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            LiveBackend::Device(source) => source.connect(),
        }
    }

    /// Capture the next frame, blocking until one is available.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, AnalysisError> {
        match &mut self.backend {
            LiveBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            LiveBackend::Device(source) => source.next_frame(),
        }
    }

    /// Close the camera. Safe to call more than once.
    pub fn release(&mut self) {
        match &mut self.backend {
            LiveBackend::Synthetic(source) => source.release(),
            #[cfg(feature = "ingest-v4l2")]
            LiveBackend::Device(source) => source.release(),
        }
    }

    /// Check if the source is healthy.
    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            LiveBackend::Synthetic(source) => source.is_healthy(),
            #[cfg(feature = "ingest-v4l2")]
            LiveBackend::Device(source) => source.is_healthy(),
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> SourceStats {
        match &self.backend {
            LiveBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            LiveBackend::Device(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticLiveSource {
    config: LiveConfig,
    url: StubUrl,
    frame_count: u64,
    connected: bool,
    next_due: Option<Instant>,
}

impl SyntheticLiveSource {
    fn new(config: LiveConfig, url: StubUrl) -> Self {
        Self {
            config,
            url,
            frame_count: 0,
            connected: false,
            next_due: None,
        }
    }

    fn connect(&mut self) -> Result<(), AnalysisError> {
        self.connected = true;
        self.next_due = None;
        log::info!(
            "LiveSource: connected to {} (synthetic)",
            self.config.device
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, AnalysisError> {
        if !self.connected {
            return Err(AnalysisError::Source(format!(
                "{} is not connected",
                self.config.device
            )));
        }
        // A `frames=` bound simulates the camera going away.
        if self.url.frames.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        self.pace();
        self.frame_count += 1;
        synthetic_frame(&self.url, self.config.width, self.config.height, self.frame_count)
            .map(Some)
    }

    fn pace(&mut self) {
        if self.config.target_fps == 0 {
            return;
        }
        let interval = Duration::from_millis(1000 / self.config.target_fps as u64);
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.next_due = Some(Instant::now() + interval);
    }

    fn release(&mut self) {
        if self.connected {
            log::info!(
                "LiveSource: released {} after {} frames",
                self.config.device,
                self.frame_count
            );
        }
        self.connected = false;
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_delivered: self.frame_count,
            decode_failures: 0,
            location: self.config.device.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Production camera source using libv4l
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
struct DeviceLiveSource {
    config: LiveConfig,
    state: Option<DeviceLiveState>,
    frame_count: u64,
    decode_failures: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
    pixel_format: super::normalize::PixelFormat,
}

#[cfg(feature = "ingest-v4l2")]
#[self_referencing]
struct DeviceLiveState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

#[cfg(feature = "ingest-v4l2")]
impl DeviceLiveSource {
    fn new(config: LiveConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            frame_count: 0,
            decode_failures: 0,
            last_frame_at: None,
            last_error: None,
            pixel_format: super::normalize::PixelFormat::Rgb24,
        }
    }

    fn connect(&mut self) -> Result<(), AnalysisError> {
        use super::normalize::PixelFormat;
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let source_err = |what: &str, err: std::io::Error| {
            AnalysisError::Source(format!("{}: {}", what, err))
        };

        let mut device = v4l::Device::with_path(&self.config.device)
            .map_err(|e| source_err(&format!("open camera {}", self.config.device), e))?;
        let mut format = device
            .format()
            .map_err(|e| source_err("read camera format", e))?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "LiveSource: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .map_err(|e| source_err("read camera format after set failure", e))?
            }
        };

        self.pixel_format = match &format.fourcc.repr {
            b"RGB3" => PixelFormat::Rgb24,
            b"YUYV" => PixelFormat::Yuyv,
            b"NV12" => PixelFormat::Nv12,
            other => {
                return Err(AnalysisError::Source(format!(
                    "camera {} only offers unsupported pixel format {}",
                    self.config.device,
                    String::from_utf8_lossy(other)
                )))
            }
        };

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "LiveSource: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.last_error = None;

        let state = DeviceLiveStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            source_err("create camera buffer stream", err)
        })?;
        self.state = Some(state);

        log::info!(
            "LiveSource: connected to {} ({}x{}, {:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.pixel_format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, AnalysisError> {
        use v4l::io::traits::CaptureStream;

        let Some(state) = self.state.as_mut() else {
            return Err(AnalysisError::Source(format!(
                "camera {} is not connected",
                self.config.device
            )));
        };
        let (width, height, format) = (self.active_width, self.active_height, self.pixel_format);
        let captured = state.with_mut(|fields| {
            fields.stream.next().map(|(buf, meta)| {
                let used = (meta.bytesused as usize).min(buf.len());
                super::normalize::normalize_to_rgb(&buf[..used], width, height, format)
            })
        });
        let converted = captured.map_err(|err| {
            self.last_error = Some(err.to_string());
            AnalysisError::Source(format!("capture from {}: {}", self.config.device, err))
        })?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        let index = self.frame_count;
        let frame = converted
            .map_err(|err| AnalysisError::FrameDecode(format!("frame {}: {:#}", index, err)))
            .and_then(|pixels| Frame::new(pixels, width, height, index));
        if frame.is_err() {
            self.decode_failures += 1;
        }
        frame.map(Some)
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!(
                "LiveSource: released {} after {} frames",
                self.config.device,
                self.frame_count
            );
        }
    }

    fn is_healthy(&self) -> bool {
        if self.state.is_none() || self.last_error.is_some() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_delivered: self.frame_count,
            decode_failures: self.decode_failures,
            location: self.config.device.clone(),
        }
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(device: &str) -> LiveConfig {
        LiveConfig {
            device: device.to_string(),
            target_fps: 0,
            width: 64,
            height: 48,
        }
    }

    #[test]
    fn live_source_produces_frames() -> anyhow::Result<()> {
        let mut source = LiveSource::new(stub_config("stub://dashcam"))?;
        source.connect()?;

        let frame = source.next_frame()?.expect("live feeds keep producing");
        assert_eq!(frame.dimensions(), (64, 48));
        assert_eq!(frame.index, 1);
        assert!(source.is_healthy());
        Ok(())
    }

    #[test]
    fn next_frame_before_connect_fails() -> anyhow::Result<()> {
        let mut source = LiveSource::new(stub_config("stub://dashcam"))?;
        assert!(matches!(source.next_frame(), Err(AnalysisError::Source(_))));
        Ok(())
    }

    #[test]
    fn frames_bound_ends_feed() -> anyhow::Result<()> {
        let mut source = LiveSource::new(stub_config("stub://dashcam?frames=3"))?;
        source.connect()?;
        let mut delivered = 0;
        while source.next_frame()?.is_some() {
            delivered += 1;
        }
        assert_eq!(delivered, 3);
        assert_eq!(source.stats().frames_delivered, 3);
        Ok(())
    }

    #[test]
    fn release_disconnects() -> anyhow::Result<()> {
        let mut source = LiveSource::new(stub_config("stub://dashcam"))?;
        source.connect()?;
        source.release();
        source.release();
        assert!(!source.is_healthy());
        assert!(source.next_frame().is_err());
        Ok(())
    }

    #[test]
    fn pacing_spaces_frames() -> anyhow::Result<()> {
        let mut config = stub_config("stub://dashcam");
        config.target_fps = 50;
        let mut source = LiveSource::new(config)?;
        source.connect()?;

        let started = Instant::now();
        for _ in 0..3 {
            source.next_frame()?;
        }
        assert!(started.elapsed() >= Duration::from_millis(35));
        Ok(())
    }
}
