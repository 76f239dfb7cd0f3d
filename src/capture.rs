//! Image acquisition.
//! Live frames come from a monitor via `xcap` (point a webcam preview, phone
//! mirror or scanner window at the scoresheet), optionally cropped to a
//! configured region. Picked files are read from disk, plain image bytes or
//! a `data:` URL. Both paths end in the same downscaled JPEG/base64 payload.
//! Permissions note: On macOS, grant "Screen & System Audio Recording" permission to the terminal in System Settings > Privacy & Security.

use anyhow::{Context, Result, bail};
use base64::{Engine as _, engine::general_purpose};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageReader};
use std::io::Cursor;
use std::path::Path;
use std::time::Instant;
use xcap::Monitor;

use crate::config::CaptureRegion;
use crate::error::AppError;

/// Longest edge of an uploaded image.
pub const MAX_DIMENSION: u32 = 1024;
/// JPEG quality for uploads.
pub const JPEG_QUALITY: u8 = 50;

/// A device that yields still frames until released.
pub trait FrameSource {
    fn grab(&mut self) -> Result<DynamicImage>;
    fn release(&mut self);
}

/// Frames from one monitor of the local display.
pub struct ScreenSource {
    monitor: Option<Monitor>,
    region: Option<CaptureRegion>,
}

impl ScreenSource {
    pub fn open(monitor_index: usize, region: Option<CaptureRegion>) -> Result<Self, AppError> {
        let monitors = Monitor::all()
            .map_err(|e| AppError::CameraUnavailable(format!("Failed to enumerate monitors: {}", e)))?;
        let count = monitors.len();
        let monitor = monitors.into_iter().nth(monitor_index).ok_or_else(|| {
            AppError::CameraUnavailable(format!(
                "Monitor {} not found ({} available)",
                monitor_index, count
            ))
        })?;
        Ok(Self {
            monitor: Some(monitor),
            region,
        })
    }
}

impl FrameSource for ScreenSource {
    fn grab(&mut self) -> Result<DynamicImage> {
        let start = Instant::now();
        let monitor = self.monitor.as_ref().context("Capture source already released")?;

        let screenshot_raw = monitor
            .capture_image()
            .context("Failed to capture image. On macOS, ensure the terminal has Screen Recording permission in System Settings > Privacy & Security > Screen & System Audio Recording")?;

        let screenshot = DynamicImage::ImageRgba8(screenshot_raw);
        if screenshot.dimensions() == (0, 0) {
            bail!("Captured empty frame - possible permission issue or no display");
        }

        let frame = match self.region {
            Some(region) => crop_to_region(&screenshot, region)?,
            None => screenshot,
        };
        tracing::debug!("Capture latency: {:?}", start.elapsed());
        Ok(frame)
    }

    fn release(&mut self) {
        self.monitor = None;
    }
}

fn crop_to_region(frame: &DynamicImage, region: CaptureRegion) -> Result<DynamicImage> {
    let (frame_w, frame_h) = frame.dimensions();
    let CaptureRegion { x, y, width, height } = region;

    if x >= frame_w || y >= frame_h
        || x.saturating_add(width) > frame_w || y.saturating_add(height) > frame_h
    {
        bail!(
            "Crop region ({},{},{},{}) exceeds frame dimensions {}x{}",
            x, y, width, height, frame_w, frame_h
        );
    }
    Ok(frame.crop_imm(x, y, width, height))
}

/// An open frame source that is released exactly once: after a capture
/// attempt, on cancel, or when dropped, whichever comes first.
pub struct LiveCapture<S: FrameSource> {
    source: S,
    released: bool,
}

impl<S: FrameSource> LiveCapture<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            released: false,
        }
    }

    /// Grabs the current frame and returns it ready for upload.
    pub fn capture(&mut self) -> Result<String, AppError> {
        if self.released {
            return Err(AppError::CameraUnavailable("capture already finished".to_string()));
        }
        let frame = self.source.grab();
        self.release();
        let frame = frame.map_err(|e| AppError::CameraUnavailable(format!("{:#}", e)))?;
        encode_for_upload(&frame)
    }

    pub fn cancel(&mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.source.release();
        }
    }
}

impl<S: FrameSource> Drop for LiveCapture<S> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Reads an image file (or a file holding a `data:` URL) for upload.
pub fn load_image_file(path: &Path) -> Result<String, AppError> {
    let bytes = std::fs::read(path)
        .map_err(|e| AppError::InvalidImageFormat(format!("{}: {}", path.display(), e)))?;
    let image_bytes = if bytes.starts_with(b"data:") {
        decode_data_url(&bytes)?
    } else {
        bytes
    };
    let img = decode_upright(&image_bytes)
        .map_err(|e| AppError::InvalidImageFormat(format!("{}: {}", path.display(), e)))?;
    encode_for_upload(&img)
}

/// Decodes image bytes and applies the EXIF orientation, so phone photos
/// arrive upright once the metadata is stripped by re-encoding.
fn decode_upright(bytes: &[u8]) -> image::ImageResult<DynamicImage> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);
    Ok(img)
}

fn decode_data_url(bytes: &[u8]) -> Result<Vec<u8>, AppError> {
    let invalid = |reason: &str| AppError::InvalidImageFormat(reason.to_string());

    let text = std::str::from_utf8(bytes).map_err(|_| invalid("data URL is not valid text"))?;
    let (header, payload) = text.split_once(',').ok_or_else(|| invalid("data URL has no payload"))?;
    if !header.ends_with(";base64") {
        return Err(invalid("data URL is not base64 encoded"));
    }
    let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if payload.is_empty() {
        return Err(invalid("data URL has no payload"));
    }
    general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| AppError::InvalidImageFormat(format!("data URL payload: {}", e)))
}

/// Fits `(width, height)` inside [`MAX_DIMENSION`], keeping aspect ratio. Never upscales.
pub fn scaled_dimensions(width: u32, height: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= MAX_DIMENSION {
        return (width, height);
    }
    let scale = |side: u32| ((side as f64 * MAX_DIMENSION as f64 / longest as f64).round() as u32).max(1);
    if width >= height {
        (MAX_DIMENSION, scale(height))
    } else {
        (scale(width), MAX_DIMENSION)
    }
}

/// Downscales, encodes as JPEG and returns the base64 payload.
pub fn encode_for_upload(img: &DynamicImage) -> Result<String, AppError> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(AppError::InvalidImageFormat("image is empty".to_string()));
    }

    let (target_w, target_h) = scaled_dimensions(width, height);
    let rgb = if (target_w, target_h) == (width, height) {
        img.to_rgb8()
    } else {
        img.resize_exact(target_w, target_h, FilterType::Triangle).to_rgb8()
    };

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| AppError::InvalidImageFormat(format!("JPEG encoding failed: {}", e)))?;

    let encoded = general_purpose::STANDARD.encode(&jpeg);
    if encoded.is_empty() {
        return Err(AppError::InvalidImageFormat("encoded image is empty".to_string()));
    }
    tracing::debug!(
        "Encoded {}x{} frame as {}x{} JPEG ({} bytes)",
        width, height, target_w, target_h, jpeg.len()
    );
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::cell::Cell;
    use std::io::Write;
    use std::rc::Rc;

    struct FakeSource {
        releases: Rc<Cell<u32>>,
        fail: bool,
    }

    impl FrameSource for FakeSource {
        fn grab(&mut self) -> Result<DynamicImage> {
            if self.fail {
                bail!("sensor unplugged");
            }
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(1280, 720, Rgb([240, 240, 240]))))
        }

        fn release(&mut self) {
            self.releases.set(self.releases.get() + 1);
        }
    }

    fn fake(fail: bool) -> (LiveCapture<FakeSource>, Rc<Cell<u32>>) {
        let releases = Rc::new(Cell::new(0));
        let source = FakeSource { releases: Rc::clone(&releases), fail };
        (LiveCapture::new(source), releases)
    }

    fn decoded(base64: &str) -> DynamicImage {
        let bytes = general_purpose::STANDARD.decode(base64).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8], "payload is not a JPEG");
        image::load_from_memory(&bytes).unwrap()
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 20, 30])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    #[test]
    fn test_scaled_dimensions() {
        assert_eq!(scaled_dimensions(1280, 720), (1024, 576));
        assert_eq!(scaled_dimensions(720, 1280), (576, 1024));
        assert_eq!(scaled_dimensions(800, 600), (800, 600));
        assert_eq!(scaled_dimensions(1024, 1024), (1024, 1024));
        assert_eq!(scaled_dimensions(4000, 1), (1024, 1));
    }

    #[test]
    fn test_capture_downscales_and_releases_once() {
        let (mut capture, releases) = fake(false);
        let payload = capture.capture().unwrap();
        assert_eq!(decoded(&payload).dimensions(), (1024, 576));
        assert_eq!(releases.get(), 1);

        capture.cancel();
        drop(capture);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_failed_grab_still_releases() {
        let (mut capture, releases) = fake(true);
        let err = capture.capture().unwrap_err();
        assert!(matches!(err, AppError::CameraUnavailable(ref msg) if msg.contains("sensor unplugged")));
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_cancel_then_drop_releases_once() {
        let (mut capture, releases) = fake(false);
        capture.cancel();
        capture.cancel();
        assert!(capture.capture().is_err());
        drop(capture);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_drop_releases() {
        let (capture, releases) = fake(false);
        drop(capture);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_crop_to_region_bounds() {
        let frame = DynamicImage::ImageRgb8(RgbImage::new(200, 100));
        let region = CaptureRegion { x: 50, y: 10, width: 100, height: 80 };
        assert_eq!(crop_to_region(&frame, region).unwrap().dimensions(), (100, 80));

        let too_wide = CaptureRegion { x: 150, y: 0, width: 100, height: 50 };
        assert!(crop_to_region(&frame, too_wide).is_err());
    }

    #[test]
    fn test_load_image_file_reencodes_as_jpeg() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&png_bytes(2048, 1536)).unwrap();
        let payload = load_image_file(file.path()).unwrap();
        assert_eq!(decoded(&payload).dimensions(), (1024, 768));
    }

    /// A JPEG carrying an EXIF Orientation tag.
    fn jpeg_with_orientation(width: u32, height: u32, orientation: u8) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 200, 200]));
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 90).encode_image(&img).unwrap();

        let mut exif = b"Exif\0\0MM\0\x2a\0\0\0\x08".to_vec();
        exif.extend_from_slice(&[0x00, 0x01]);
        exif.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
        exif.extend_from_slice(&[0x00, orientation, 0x00, 0x00]);
        exif.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        let mut app1 = vec![0xFF, 0xE1];
        app1.extend_from_slice(&((exif.len() + 2) as u16).to_be_bytes());
        app1.extend_from_slice(&exif);
        jpeg.splice(2..2, app1);
        jpeg
    }

    #[test]
    fn test_load_image_file_applies_exif_orientation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&jpeg_with_orientation(64, 32, 6)).unwrap();
        let payload = load_image_file(file.path()).unwrap();
        assert_eq!(decoded(&payload).dimensions(), (32, 64));
    }

    #[test]
    fn test_load_image_file_accepts_data_url() {
        let url = format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(png_bytes(64, 48))
        );
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(url.as_bytes()).unwrap();
        let payload = load_image_file(file.path()).unwrap();
        assert_eq!(decoded(&payload).dimensions(), (64, 48));
    }

    #[test]
    fn test_load_image_file_rejects_bad_input() {
        let mut garbage = tempfile::NamedTempFile::new().unwrap();
        garbage.write_all(b"not an image at all").unwrap();
        assert!(matches!(load_image_file(garbage.path()), Err(AppError::InvalidImageFormat(_))));

        let mut no_payload = tempfile::NamedTempFile::new().unwrap();
        no_payload.write_all(b"data:image/jpeg;base64,").unwrap();
        assert!(matches!(load_image_file(no_payload.path()), Err(AppError::InvalidImageFormat(_))));

        let missing = Path::new("/nonexistent/scoresheet.jpg");
        assert!(matches!(load_image_file(missing), Err(AppError::InvalidImageFormat(_))));
    }
}
