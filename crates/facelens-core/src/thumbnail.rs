//! Face thumbnails and the pixel-difference similarity between them.
//!
//! A thumbnail is encoded image bytes (PNG, JPEG, ...). Comparison decodes
//! both sides, resamples each to a 100×100 RGB grid and averages a per-pixel
//! colour agreement. This is a crude perceptual comparison: it is sensitive
//! to pose, lighting and crop alignment.

use crate::geometry::InvalidDetection;
use crate::types::Detection;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;

/// Side length of the grid both thumbnails are resampled to before comparison.
pub const CANONICAL_SIZE: u32 = 100;
/// Largest possible |ΔR| + |ΔG| + |ΔB| for 8-bit channels.
const MAX_CHANNEL_DIFF: f64 = 3.0 * 255.0;
const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64";

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("thumbnail could not be decoded: {0}")]
    Decode(#[source] image::ImageError),
    #[error("thumbnail could not be encoded: {0}")]
    Encode(#[source] image::ImageError),
    #[error("malformed data URL: {0}")]
    DataUrl(String),
    #[error(transparent)]
    InvalidDetection(#[from] InvalidDetection),
}

/// Encoded face image. Cloning shares the underlying bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Thumbnail {
    bytes: Arc<[u8]>,
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thumbnail")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Thumbnail {
    /// Wrap already-encoded image bytes. Nothing is decoded until comparison.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
        }
    }

    /// Encode a whole image as a PNG thumbnail.
    pub fn from_image(image: &DynamicImage) -> Result<Self, ThumbnailError> {
        let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
        let mut buf = Vec::new();
        rgba.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(ThumbnailError::Encode)?;
        Ok(Self::from_bytes(buf))
    }

    /// Crop a detection's bounding box out of `frame` and encode it as PNG.
    ///
    /// The box is clamped to the frame; a box that misses the frame entirely
    /// is an invalid detection.
    pub fn crop_from_frame(frame: &DynamicImage, detection: &Detection) -> Result<Self, ThumbnailError> {
        let (frame_width, frame_height) = (frame.width(), frame.height());
        let outside = InvalidDetection::OutsideFrame {
            frame_width,
            frame_height,
        };

        let (x0, y0) = detection.top_left;
        let (x1, y1) = detection.bottom_right;
        if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) {
            return Err(outside.into());
        }

        let left = x0.floor().clamp(0.0, frame_width as f32) as u32;
        let top = y0.floor().clamp(0.0, frame_height as f32) as u32;
        let right = x1.ceil().clamp(0.0, frame_width as f32) as u32;
        let bottom = y1.ceil().clamp(0.0, frame_height as f32) as u32;
        if right <= left || bottom <= top {
            return Err(outside.into());
        }

        let crop = frame.crop_imm(left, top, right - left, bottom - top);
        Self::from_image(&crop)
    }

    /// Parse a `data:<mime>;base64,<payload>` URL as produced by a browser canvas.
    pub fn from_data_url(url: &str) -> Result<Self, ThumbnailError> {
        let rest = url
            .strip_prefix(DATA_URL_PREFIX)
            .ok_or_else(|| ThumbnailError::DataUrl("missing 'data:' scheme".into()))?;
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| ThumbnailError::DataUrl("missing ',' separator".into()))?;
        if !meta.ends_with(BASE64_MARKER) {
            return Err(ThumbnailError::DataUrl("payload is not base64".into()));
        }
        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| ThumbnailError::DataUrl(e.to_string()))?;
        Ok(Self::from_bytes(bytes))
    }

    /// Render as a base64 data URL; the MIME type is sniffed from the bytes.
    pub fn to_data_url(&self) -> String {
        let mime = image::guess_format(&self.bytes)
            .map(|f| f.to_mime_type())
            .unwrap_or("application/octet-stream");
        format!("data:{mime};base64,{}", BASE64.encode(&self.bytes))
    }

    pub fn decode(&self) -> Result<DynamicImage, ThumbnailError> {
        image::load_from_memory(&self.bytes).map_err(ThumbnailError::Decode)
    }

    /// Decode and resample to the 100×100 comparison grid (bilinear, alpha dropped).
    pub fn canonical(&self) -> Result<CanonicalGrid, ThumbnailError> {
        let image = self.decode()?;
        Ok(CanonicalGrid(
            image
                .resize_exact(CANONICAL_SIZE, CANONICAL_SIZE, FilterType::Triangle)
                .to_rgb8(),
        ))
    }
}

/// A thumbnail resampled to `CANONICAL_SIZE`² RGB pixels.
#[derive(Debug, Clone)]
pub struct CanonicalGrid(RgbImage);

impl CanonicalGrid {
    /// Mean of `1 - (|ΔR| + |ΔG| + |ΔB|) / 765` over all pixels, in [0, 1].
    pub fn similarity(&self, other: &CanonicalGrid) -> f32 {
        let pixels = (CANONICAL_SIZE * CANONICAL_SIZE) as f64;
        let total: f64 = self
            .0
            .pixels()
            .zip(other.0.pixels())
            .map(|(a, b)| {
                let diff: u32 = a
                    .0
                    .iter()
                    .zip(b.0.iter())
                    .map(|(&ca, &cb)| u32::from(ca.abs_diff(cb)))
                    .sum();
                1.0 - f64::from(diff) / MAX_CHANNEL_DIFF
            })
            .sum();
        (total / pixels) as f32
    }
}

/// Decode both thumbnails and compare them on the canonical grid.
pub fn similarity(a: &Thumbnail, b: &Thumbnail) -> Result<f32, ThumbnailError> {
    Ok(a.canonical()?.similarity(&b.canonical()?))
}
