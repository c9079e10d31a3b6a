//! Video container decoding with FFmpeg.
//!
//! Frames are scaled to RGB24 at native resolution. End of stream flushes the
//! decoder and then reports `Ok(None)`.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;

use super::file::FileConfig;
use super::SourceStats;
use crate::error::AnalysisError;
use crate::frame::Frame;

struct DecoderState {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    eof_sent: bool,
}

pub(crate) struct FfmpegFileSource {
    config: FileConfig,
    state: Option<DecoderState>,
    frame_count: u64,
    decode_failures: u64,
    last_error: Option<String>,
}

impl FfmpegFileSource {
    pub(crate) fn new(config: FileConfig) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&config.path)
            .with_context(|| format!("failed to open video '{}' with ffmpeg", config.path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            config,
            state: Some(DecoderState {
                input,
                stream_index,
                decoder,
                scaler,
                eof_sent: false,
            }),
            frame_count: 0,
            decode_failures: 0,
            last_error: None,
        })
    }

    pub(crate) fn connect(&mut self) -> Result<(), AnalysisError> {
        if self.state.is_none() {
            return Err(AnalysisError::Source(format!(
                "{} was already released",
                self.config.path
            )));
        }
        log::info!("FileSource: connected to {} (ffmpeg)", self.config.path);
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>, AnalysisError> {
        let Some(state) = self.state.as_mut() else {
            return Ok(None);
        };
        let mut decoded = ffmpeg::frame::Video::empty();

        loop {
            if state.decoder.receive_frame(&mut decoded).is_ok() {
                self.frame_count += 1;
                let index = self.frame_count;
                let result = scale_to_frame(&mut state.scaler, &decoded, index);
                if let Err(err) = &result {
                    self.decode_failures += 1;
                    self.last_error = Some(err.to_string());
                } else {
                    self.last_error = None;
                }
                return result.map(Some);
            }
            if state.eof_sent {
                return Ok(None);
            }

            let mut fed = false;
            for (stream, packet) in state.input.packets() {
                if stream.index() != state.stream_index {
                    continue;
                }
                if let Err(err) = state.decoder.send_packet(&packet) {
                    // Corrupt packets surface as skipped frames.
                    self.frame_count += 1;
                    self.decode_failures += 1;
                    self.last_error = Some(err.to_string());
                    return Err(AnalysisError::FrameDecode(format!(
                        "frame {}: {}",
                        self.frame_count, err
                    )));
                }
                fed = true;
                break;
            }
            if !fed {
                state.decoder.send_eof().map_err(|e| {
                    AnalysisError::Source(format!("flush ffmpeg decoder: {}", e))
                })?;
                state.eof_sent = true;
            }
        }
    }

    pub(crate) fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!(
                "FileSource: released {} after {} frames",
                self.config.path,
                self.frame_count
            );
        }
    }

    pub(crate) fn is_healthy(&self) -> bool {
        self.state.is_some() && self.last_error.is_none()
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_delivered: self.frame_count,
            decode_failures: self.decode_failures,
            location: self.config.path.clone(),
        }
    }
}

fn scale_to_frame(
    scaler: &mut ffmpeg::software::scaling::Context,
    decoded: &ffmpeg::frame::Video,
    index: u64,
) -> Result<Frame, AnalysisError> {
    let mut rgb_frame = ffmpeg::frame::Video::empty();
    scaler
        .run(decoded, &mut rgb_frame)
        .map_err(|e| AnalysisError::FrameDecode(format!("frame {}: scale to RGB: {}", index, e)))?;
    let (pixels, width, height) = frame_to_pixels(&rgb_frame)
        .map_err(|e| AnalysisError::FrameDecode(format!("frame {}: {:#}", index, e)))?;
    Frame::new(pixels, width, height, index)
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data
            .get(..len)
            .context("ffmpeg frame is shorter than its dimensions")?;
        return Ok((pixels.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
