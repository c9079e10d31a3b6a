//! Box drawing for annotated output.
//!
//! Each detection gets a hollow outline plus a caption tab with its label and
//! confidence. Caption text needs a TrueType font: `POTHOLE_CAPTION_FONT` names
//! one explicitly, otherwise a few common system locations are tried. Without a
//! font the tab is still drawn, just without text.

use std::path::PathBuf;
use std::sync::OnceLock;

use ab_glyph::{FontVec, PxScale};
use image::Rgb;
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use super::result::Detection;
use crate::frame::Frame;

const BOX_COLOR: Rgb<u8> = Rgb([255, 56, 56]);
const CAPTION_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const CAPTION_FONT_ENV: &str = "POTHOLE_CAPTION_FONT";

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Draw the outline and caption of a normalized detection box onto the frame.
///
/// Boxes are clamped to the frame; degenerate boxes still draw a single pixel.
pub(crate) fn draw_detection(frame: &mut Frame, detection: &Detection) {
    let (width, height) = frame.dimensions();
    let thickness = line_thickness(width, height);
    let x0 = to_pixel(detection.x, width);
    let y0 = to_pixel(detection.y, height);
    let x1 = to_pixel(detection.x + detection.w, width).max(x0);
    let y1 = to_pixel(detection.y + detection.h, height).max(y0);
    let image = frame.image_mut();

    for t in 0..thickness {
        let (left, top) = (x0 + t, y0 + t);
        let (right, bottom) = (x1.saturating_sub(t), y1.saturating_sub(t));
        if right < left || bottom < top {
            break;
        }
        let rect = Rect::at(left as i32, top as i32).of_size(right - left + 1, bottom - top + 1);
        draw_hollow_rect_mut(image, rect, BOX_COLOR);
    }

    let scale = caption_scale(height);
    let tab_height = scale.ceil() as u32 + 2;
    if tab_height * 2 > height {
        return;
    }
    // Above the box when there is room, otherwise just inside its top edge.
    let tab_top = if y0 >= tab_height {
        y0 - tab_height
    } else {
        y0 + thickness
    };

    let caption = caption_text(detection);
    let font = caption_font();
    let text_width = match font {
        Some(font) => text_size(PxScale::from(scale), font, &caption).0,
        None => caption.chars().count() as u32 * scale as u32 / 2,
    };
    let tab = Rect::at(x0 as i32, tab_top as i32).of_size(text_width + 4, tab_height);
    draw_filled_rect_mut(image, tab, BOX_COLOR);
    if let Some(font) = font {
        draw_text_mut(
            image,
            CAPTION_TEXT_COLOR,
            x0 as i32 + 2,
            tab_top as i32 + 1,
            PxScale::from(scale),
            font,
            &caption,
        );
    }
}

/// `"{label} {confidence:.2}"`, e.g. `pothole 0.87`.
pub(crate) fn caption_text(detection: &Detection) -> String {
    format!("{} {:.2}", detection.class.label(), detection.confidence)
}

fn caption_scale(height: u32) -> f32 {
    (height as f32 / 40.0).clamp(10.0, 24.0)
}

fn caption_font() -> Option<&'static FontVec> {
    static FONT: OnceLock<Option<FontVec>> = OnceLock::new();
    FONT.get_or_init(load_caption_font).as_ref()
}

fn load_caption_font() -> Option<FontVec> {
    let configured = std::env::var_os(CAPTION_FONT_ENV).map(PathBuf::from);
    let font = configured
        .into_iter()
        .chain(FONT_CANDIDATES.iter().map(PathBuf::from))
        .find_map(|path| {
            let bytes = std::fs::read(&path).ok()?;
            match FontVec::try_from_vec(bytes) {
                Ok(font) => {
                    log::debug!("render: caption font {}", path.display());
                    Some(font)
                }
                Err(err) => {
                    log::warn!("render: {} is not a usable font: {}", path.display(), err);
                    None
                }
            }
        });
    if font.is_none() {
        log::warn!(
            "render: no caption font found (set {}); captions are drawn without text",
            CAPTION_FONT_ENV
        );
    }
    font
}

fn to_pixel(normalized: f32, extent: u32) -> u32 {
    let max = extent.saturating_sub(1);
    let value = (normalized.clamp(0.0, 1.0) * extent as f32).round() as u32;
    value.min(max)
}

fn line_thickness(width: u32, height: u32) -> u32 {
    ((width + height) / 600).clamp(1, 6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::{DefectClass, DetectionResult};

    fn gray_frame(width: u32, height: u32) -> Frame {
        Frame::new(vec![90u8; (width * height * 3) as usize], width, height, 1).unwrap()
    }

    fn detection(x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection {
            x,
            y,
            w,
            h,
            confidence: 0.9,
            class: DefectClass::Pothole,
        }
    }

    #[test]
    fn outline_is_drawn_and_interior_untouched() {
        let frame = gray_frame(100, 100);
        let result = DetectionResult::new(vec![detection(0.2, 0.2, 0.5, 0.5)]);
        let annotated = result.render(&frame);

        assert_eq!(annotated.image().get_pixel(20, 20), &BOX_COLOR);
        assert_eq!(annotated.image().get_pixel(70, 45), &BOX_COLOR);
        assert_eq!(annotated.image().get_pixel(45, 45), &Rgb([90, 90, 90]));
        // Source frame is left untouched.
        assert_eq!(frame.image().get_pixel(20, 20), &Rgb([90, 90, 90]));
    }

    #[test]
    fn out_of_range_boxes_are_clamped() {
        let frame = gray_frame(10, 10);
        let result = DetectionResult::new(vec![detection(-0.5, 0.8, 2.0, 2.0)]);
        let annotated = result.render(&frame);
        assert_eq!(annotated.image().get_pixel(9, 9), &BOX_COLOR);
        assert_eq!(annotated.image().get_pixel(0, 8), &BOX_COLOR);
    }

    #[test]
    fn caption_tab_sits_above_the_box() {
        let frame = gray_frame(200, 200);
        let result = DetectionResult::new(vec![detection(0.3, 0.3, 0.4, 0.4)]);
        let annotated = result.render(&frame);
        let gray = Rgb([90, 90, 90]);

        // Box top edge is row 60; the tab occupies the 12 rows above it.
        let changed = (48..60)
            .flat_map(|y| (60..90).map(move |x| (x, y)))
            .filter(|&(x, y)| annotated.image().get_pixel(x, y) != &gray)
            .count();
        assert!(changed > 0, "caption area was not drawn");
        assert_eq!(annotated.image().get_pixel(61, 40), &gray);
        assert_eq!(annotated.image().get_pixel(100, 100), &gray);
    }

    #[test]
    fn caption_moves_inside_boxes_at_the_top_edge() {
        let frame = gray_frame(200, 200);
        let result = DetectionResult::new(vec![detection(0.1, 0.0, 0.5, 0.5)]);
        let annotated = result.render(&frame);
        assert_ne!(annotated.image().get_pixel(21, 5), &Rgb([90, 90, 90]));
    }

    #[test]
    fn caption_text_carries_label_and_confidence() {
        assert_eq!(caption_text(&detection(0.0, 0.0, 0.1, 0.1)), "pothole 0.90");
        let unknown = Detection {
            confidence: 0.416,
            class: DefectClass::Unknown,
            ..detection(0.0, 0.0, 0.1, 0.1)
        };
        assert_eq!(caption_text(&unknown), "defect 0.42");
    }

    #[test]
    fn empty_result_renders_identical_frame() {
        let frame = gray_frame(8, 8);
        let annotated = DetectionResult::default().render(&frame);
        assert_eq!(annotated.pixels(), frame.pixels());
    }
}
