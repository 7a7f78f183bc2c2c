//! Per-frame transform
//!
//! The pipeline treats the transform as an opaque, possibly slow collaborator
//! called from a single worker. [`AnnotatingTransform`] is the bundled
//! implementation: downscale, run a [`Detector`], outline and label what it
//! found, stamp the wall-clock time and encode the result as JPEG.

use std::io::Cursor;

use ab_glyph::{FontRef, PxScale};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::error::{Error, Result};

use super::frame::Frame;

/// Box outline colour
const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Box outline thickness in pixels
const BOX_THICKNESS: u32 = 2;

/// Timestamp colour
const CLOCK_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const LABEL_SCALE: f32 = 18.0;

const CLOCK_SCALE: f32 = 24.0;

/// DejaVu Sans, see `assets/fonts/LICENSE-DejaVu`
static FONT_DATA: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

/// Frame-to-payload transform
///
/// `Ok(None)` is the empty outcome: the frame produced nothing worth
/// delivering. Errors are treated the same way by the pipeline.
pub trait Transform: Send + 'static {
    fn transform(&mut self, frame: &Frame) -> Result<Option<Bytes>>;
}

impl<F> Transform for F
where
    F: FnMut(&Frame) -> Result<Option<Bytes>> + Send + 'static,
{
    fn transform(&mut self, frame: &Frame) -> Result<Option<Bytes>> {
        self(frame)
    }
}

/// A detected object, in pixel coordinates of the image handed to the detector
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub label: String,
    pub confidence: f32,
}

impl Detection {
    fn rect(&self) -> Option<Rect> {
        let width = self.x2.checked_sub(self.x1)?;
        let height = self.y2.checked_sub(self.y1)?;
        if width <= 0 || height <= 0 {
            return None;
        }
        Some(Rect::at(self.x1, self.y1).of_size(width as u32, height as u32))
    }
}

/// Object detector backend
pub trait Detector: Send + 'static {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;
}

/// Detector that never finds anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDetector;

impl Detector for NoopDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}

/// Transform settings
#[derive(Debug, Clone)]
pub struct TransformConfig {
    /// Maximum width before detection; larger frames are downscaled
    pub resize_width: Option<u32>,
    /// Minimum detection confidence to draw
    pub confidence_threshold: f32,
    /// JPEG quality, 1..=100
    pub jpeg_quality: u8,
    /// Stamp `HH:MM:SS` local time in the top-left corner
    pub timestamp: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            resize_width: Some(960),
            confidence_threshold: 0.4,
            jpeg_quality: 80,
            timestamp: true,
        }
    }
}

/// Resize, detect, annotate, encode
pub struct AnnotatingTransform<D: Detector> {
    detector: D,
    config: TransformConfig,
    /// `None` disables text; boxes are still drawn
    font: Option<FontRef<'static>>,
}

impl<D: Detector> AnnotatingTransform<D> {
    /// Create a transform around `detector`
    pub fn new(detector: D, config: TransformConfig) -> Self {
        Self {
            detector,
            config,
            font: bundled_font(),
        }
    }
}

fn bundled_font() -> Option<FontRef<'static>> {
    match FontRef::try_from_slice(FONT_DATA) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!(error = %e, "Bundled font unreadable, drawing boxes without text");
            None
        }
    }
}

impl<D: Detector> Transform for AnnotatingTransform<D> {
    fn transform(&mut self, frame: &Frame) -> Result<Option<Bytes>> {
        let image = RgbImage::from_raw(frame.width, frame.height, frame.payload.to_vec())
            .ok_or_else(|| {
                Error::Transform(format!(
                    "payload of {} bytes does not match {}x{} RGB",
                    frame.payload.len(),
                    frame.width,
                    frame.height
                ))
            })?;

        let mut image = downscale(image, self.config.resize_width);

        let detections = self.detector.detect(&image)?;
        for detection in detections
            .iter()
            .filter(|d| d.confidence >= self.config.confidence_threshold)
        {
            annotate(&mut image, detection, self.font.as_ref());
        }

        if self.config.timestamp {
            if let Some(font) = self.font.as_ref() {
                draw_clock(&mut image, font, &chrono::Local::now().format("%H:%M:%S").to_string());
            }
        }

        match encode_jpeg(&image, self.config.jpeg_quality) {
            Ok(jpeg) => Ok(Some(jpeg)),
            Err(e) => {
                tracing::debug!(sequence = frame.sequence, error = %e, "JPEG encode failed");
                Ok(None)
            }
        }
    }
}

/// Target size for a downscale to `max_width`, preserving aspect ratio.
///
/// Returns `None` when the image is already narrow enough.
pub fn scaled_size(width: u32, height: u32, max_width: Option<u32>) -> Option<(u32, u32)> {
    let max_width = max_width?;
    if width <= max_width || max_width == 0 {
        return None;
    }
    let new_height = (height as u64 * max_width as u64 / width as u64).max(1) as u32;
    Some((max_width, new_height))
}

fn downscale(image: RgbImage, max_width: Option<u32>) -> RgbImage {
    match scaled_size(image.width(), image.height(), max_width) {
        Some((w, h)) => imageops::resize(&image, w, h, FilterType::Triangle),
        None => image,
    }
}

/// Outline `detection` and, given a font, write `"<label> <confidence>"` above it
fn annotate(image: &mut RgbImage, detection: &Detection, font: Option<&FontRef<'static>>) {
    let Some(rect) = detection.rect() else {
        return;
    };

    draw_box(image, rect);
    if let Some(font) = font {
        draw_label(image, font, rect, &format!("{} {:.2}", detection.label, detection.confidence));
    }
}

fn draw_box(image: &mut RgbImage, rect: Rect) {
    for inset in 0..BOX_THICKNESS as i32 {
        let (w, h) = (rect.width() as i32 - 2 * inset, rect.height() as i32 - 2 * inset);
        if w <= 0 || h <= 0 {
            break;
        }
        let inner = Rect::at(rect.left() + inset, rect.top() + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(image, inner, BOX_COLOR);
    }
}

fn draw_label(image: &mut RgbImage, font: &FontRef<'static>, rect: Rect, text: &str) {
    // Above the box when there is room, otherwise just inside its top edge
    let above = rect.top() - LABEL_SCALE as i32 - 2;
    let y = if above >= 0 { above } else { rect.top() + BOX_THICKNESS as i32 };
    draw_text_mut(image, BOX_COLOR, rect.left(), y, PxScale::from(LABEL_SCALE), font, text);
}

fn draw_clock(image: &mut RgbImage, font: &FontRef<'static>, text: &str) {
    draw_text_mut(image, CLOCK_COLOR, 10, 6, PxScale::from(CLOCK_SCALE), font, text);
}

/// Encode an RGB image as JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Bytes> {
    let mut out = Cursor::new(Vec::new());
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        encoder.encode_image(image)?;
    }
    Ok(Bytes::from(out.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32) -> Frame {
        let payload = vec![128u8; (width * height * 3) as usize];
        Frame::new(Bytes::from(payload), width, height)
    }

    struct FixedDetector(Vec<Detection>);

    impl Detector for FixedDetector {
        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_scaled_size() {
        assert_eq!(scaled_size(1920, 1080, Some(960)), Some((960, 540)));
        assert_eq!(scaled_size(640, 480, Some(960)), None);
        assert_eq!(scaled_size(960, 540, Some(960)), None);
        assert_eq!(scaled_size(1920, 1080, None), None);
        assert_eq!(scaled_size(4000, 1, Some(100)), Some((100, 1)));
    }

    #[test]
    fn test_transform_produces_jpeg() {
        let mut transform = AnnotatingTransform::new(NoopDetector, TransformConfig::default());
        let jpeg = transform.transform(&solid_frame(32, 16)).unwrap().unwrap();

        // SOI marker
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
    }

    #[test]
    fn test_transform_downscales() {
        let config = TransformConfig {
            resize_width: Some(20),
            ..TransformConfig::default()
        };
        let mut transform = AnnotatingTransform::new(NoopDetector, config);
        let jpeg = transform.transform(&solid_frame(40, 30)).unwrap().unwrap();

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 15));
    }

    #[test]
    fn test_malformed_frame_is_error() {
        let mut transform = AnnotatingTransform::new(NoopDetector, TransformConfig::default());
        let frame = Frame::new(Bytes::from_static(&[0, 1, 2]), 4, 4);

        assert!(matches!(transform.transform(&frame), Err(Error::Transform(_))));
    }

    #[test]
    fn test_low_confidence_not_drawn() {
        let detection = Detection {
            x1: 2,
            y1: 2,
            x2: 12,
            y2: 12,
            label: "person".into(),
            confidence: 0.1,
        };
        let config = TransformConfig {
            resize_width: None,
            confidence_threshold: 0.5,
            jpeg_quality: 100,
            timestamp: false,
        };

        let mut plain = AnnotatingTransform::new(NoopDetector, config.clone());
        let mut filtered = AnnotatingTransform::new(FixedDetector(vec![detection]), config);
        let frame = solid_frame(16, 16);

        assert_eq!(
            plain.transform(&frame).unwrap(),
            filtered.transform(&frame).unwrap()
        );
    }

    #[test]
    fn test_detection_drawn() {
        let mut image = RgbImage::from_pixel(16, 16, Rgb([0, 0, 0]));
        let detection = Detection {
            x1: 2,
            y1: 3,
            x2: 12,
            y2: 13,
            label: "car".into(),
            confidence: 0.9,
        };

        draw_box(&mut image, detection.rect().unwrap());

        assert_eq!(*image.get_pixel(2, 3), BOX_COLOR);
        assert_eq!(*image.get_pixel(3, 4), BOX_COLOR);
        assert_eq!(*image.get_pixel(7, 8), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_degenerate_detection_ignored() {
        let mut image = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        let detection = Detection {
            x1: 5,
            y1: 5,
            x2: 5,
            y2: 2,
            label: "x".into(),
            confidence: 1.0,
        };

        annotate(&mut image, &detection, bundled_font().as_ref());
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_label_drawn_above_box() {
        let black = Rgb([0, 0, 0]);
        let mut image = RgbImage::from_pixel(96, 64, black);
        let detection = Detection {
            x1: 4,
            y1: 40,
            x2: 60,
            y2: 60,
            label: "person".into(),
            confidence: 0.87,
        };
        let font = bundled_font().expect("bundled font");

        annotate(&mut image, &detection, Some(&font));

        let text_pixels = (0..40)
            .flat_map(|y| (0..96).map(move |x| (x, y)))
            .filter(|&(x, y)| *image.get_pixel(x, y) != black)
            .count();
        assert!(text_pixels > 0, "no label pixels above the box");
    }

    #[test]
    fn test_timestamp_stamped() {
        let black = Rgb([0, 0, 0]);
        let mut image = RgbImage::from_pixel(120, 40, black);
        let font = bundled_font().expect("bundled font");

        draw_clock(&mut image, &font, "12:34:56");

        // Top-left corner is written, the rest of the frame is not
        assert!(image.enumerate_pixels().any(|(x, y, p)| x < 110 && y < 34 && *p != black));
        assert!((0..120).all(|x| *image.get_pixel(x, 39) == black));
    }

    #[test]
    fn test_timestamp_can_be_disabled() {
        let config = TransformConfig {
            resize_width: None,
            timestamp: false,
            jpeg_quality: 100,
            ..TransformConfig::default()
        };
        let mut stamped = AnnotatingTransform::new(
            NoopDetector,
            TransformConfig {
                timestamp: true,
                ..config.clone()
            },
        );
        let mut plain = AnnotatingTransform::new(NoopDetector, config);
        let frame = Frame::new(Bytes::from(vec![0u8; 120 * 40 * 3]), 120, 40);

        assert_ne!(
            stamped.transform(&frame).unwrap(),
            plain.transform(&frame).unwrap()
        );
    }

    #[test]
    fn test_closure_transform() {
        let mut calls = 0u32;
        let mut transform = move |_frame: &Frame| -> Result<Option<Bytes>> {
            calls += 1;
            Ok(Some(Bytes::from(calls.to_string())))
        };

        let frame = solid_frame(1, 1);
        assert_eq!(
            Transform::transform(&mut transform, &frame).unwrap(),
            Some(Bytes::from_static(b"1"))
        );
    }
}
