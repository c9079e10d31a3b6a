//! Synthetic road scenes for `stub://` sources.
//!
//! Defects are painted as dark cells on the same grid the stub detector scans, so a
//! synthetic frame with `n` defects yields exactly `n` stub detections at native
//! resolution.

use image::{Rgb, RgbImage};

use crate::detect::backends::stub::{cell_bounds, GRID_SIZE};
use crate::error::AnalysisError;
use crate::frame::Frame;

/// Per-frame defect counts of the default synthetic patrol, repeated.
pub const PATROL_PATTERN: [usize; 10] = [0, 1, 0, 6, 2, 0, 0, 0, 0, 1];

/// Parsed `stub://name?defects=N&frames=M&corrupt=K`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct StubUrl {
    pub name: String,
    /// Fixed defect count for every frame; the patrol pattern when unset.
    pub defects: Option<usize>,
    /// Stream length override for bounded sources.
    pub frames: Option<u64>,
    /// Leading frames that arrive undecodable.
    pub corrupt: u64,
}

impl StubUrl {
    pub fn parse(url: &str) -> Option<Self> {
        let rest = url.strip_prefix("stub://")?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        let mut parsed = StubUrl {
            name: name.to_string(),
            ..StubUrl::default()
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key {
                "defects" => parsed.defects = value.parse().ok(),
                "frames" => parsed.frames = value.parse().ok(),
                "corrupt" => parsed.corrupt = value.parse().unwrap_or(0),
                _ => log::warn!("ignoring unknown stub parameter '{}'", key),
            }
        }
        Some(parsed)
    }

    /// Defects to paint into the frame at `index` (1-based).
    pub fn defects_for(&self, index: u64) -> usize {
        self.defects.unwrap_or_else(|| {
            let slot = (index.saturating_sub(1) % PATROL_PATTERN.len() as u64) as usize;
            PATROL_PATTERN[slot]
        })
    }
}

/// Frame `index` (1-based) of the stream, or a decode failure while the
/// `corrupt=` prefix lasts.
pub(crate) fn synthetic_frame(
    url: &StubUrl,
    width: u32,
    height: u32,
    index: u64,
) -> Result<Frame, AnalysisError> {
    if index <= url.corrupt {
        return Err(AnalysisError::FrameDecode(format!(
            "{}: synthetic frame {} is corrupt",
            url.name, index
        )));
    }
    paint_road_scene(width, height, url.defects_for(index), index)
}

/// Paint a light asphalt background with `defects` dark cells.
pub(crate) fn paint_road_scene(
    width: u32,
    height: u32,
    defects: usize,
    index: u64,
) -> Result<Frame, AnalysisError> {
    if width == 0 || height == 0 {
        return Err(AnalysisError::FrameDecode(format!(
            "synthetic frame {} has empty dimensions",
            index
        )));
    }
    let mut image = RgbImage::from_fn(width, height, |x, y| {
        let grain = ((x as u64 * 7 + y as u64 * 13 + index) % 20) as u8;
        Rgb([140 + grain, 140 + grain, 136 + grain])
    });

    let cells = (GRID_SIZE * GRID_SIZE) as usize;
    for i in 0..defects.min(cells) {
        // 7 is coprime with 64, so the first 64 slots are distinct cells.
        let cell = ((i * 7 + 3) % cells) as u32;
        let (x0, y0, x1, y1) = cell_bounds(cell % GRID_SIZE, cell / GRID_SIZE, width, height);
        for y in y0..y1 {
            for x in x0..x1 {
                let shade = 5 + ((x + y) % 10) as u8;
                image.put_pixel(x, y, Rgb([shade, shade, shade]));
            }
        }
    }

    Ok(Frame::from_image(image, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_url_parsing() {
        let url = StubUrl::parse("stub://patrol?defects=3&frames=12").unwrap();
        assert_eq!(url.name, "patrol");
        assert_eq!(url.defects, Some(3));
        assert_eq!(url.frames, Some(12));
        assert_eq!(url.corrupt, 0);
        assert!(StubUrl::parse("/tmp/video.mp4").is_none());
    }

    #[test]
    fn corrupt_prefix_fails_to_decode() {
        let url = StubUrl::parse("stub://dashcam?corrupt=2&defects=1").unwrap();
        assert!(matches!(
            synthetic_frame(&url, 32, 32, 1),
            Err(AnalysisError::FrameDecode(_))
        ));
        assert!(synthetic_frame(&url, 32, 32, 2).is_err());
        assert_eq!(synthetic_frame(&url, 32, 32, 3).unwrap().index, 3);
    }

    #[test]
    fn default_pattern_cycles() {
        let url = StubUrl::parse("stub://patrol").unwrap();
        let counts: Vec<usize> = (1..=12).map(|i| url.defects_for(i)).collect();
        assert_eq!(counts, vec![0, 1, 0, 6, 2, 0, 0, 0, 0, 1, 0, 1]);
    }

    #[test]
    fn scene_has_requested_size() -> anyhow::Result<()> {
        let frame = paint_road_scene(33, 17, 2, 4)?;
        assert_eq!(frame.dimensions(), (33, 17));
        assert_eq!(frame.index, 4);
        Ok(())
    }
}
