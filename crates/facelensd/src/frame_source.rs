//! Frames and detector output supplied by the camera/UI layer.

use facelens_core::Detection;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode frame {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid detections JSON: {0}")]
    Detections(#[from] serde_json::Error),
}

/// A frame plus whatever the external detector found in it.
#[derive(Clone)]
pub struct CapturedFrame {
    pub frame: DynamicImage,
    /// Detector output, in the detector's order. May be empty.
    pub detections: Vec<Detection>,
}

/// Something that can hand the daemon the current frame on demand.
pub trait FrameSource: Send + Sync {
    fn capture(&self) -> Result<CapturedFrame, SourceError>;
}

/// Reads the most recent frame and detections from files the UI layer
/// rewrites in a shared directory.
pub struct SnapshotDirSource {
    frame_path: PathBuf,
    detections_path: PathBuf,
}

impl SnapshotDirSource {
    pub fn new(dir: &Path, frame_file: &str, detections_file: &str) -> Self {
        Self {
            frame_path: dir.join(frame_file),
            detections_path: dir.join(detections_file),
        }
    }
}

impl FrameSource for SnapshotDirSource {
    fn capture(&self) -> Result<CapturedFrame, SourceError> {
        let frame = load_frame(&self.frame_path)?;
        let json = std::fs::read_to_string(&self.detections_path).map_err(|source| SourceError::Io {
            path: self.detections_path.clone(),
            source,
        })?;
        let detections = parse_detections_or_empty(&json)?;
        tracing::trace!(
            path = %self.frame_path.display(),
            width = frame.width(),
            height = frame.height(),
            faces = detections.len(),
            "snapshot captured"
        );
        Ok(CapturedFrame { frame, detections })
    }
}

/// Decode an image file from disk.
pub fn load_frame(path: &Path) -> Result<DynamicImage, SourceError> {
    let bytes = std::fs::read(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    image::load_from_memory(&bytes).map_err(|source| SourceError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse detector JSON; a blank string means "no detections".
pub fn parse_detections_or_empty(json: &str) -> Result<Vec<Detection>, SourceError> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(facelens_core::parse_detections(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    const DETECTIONS: &str = r#"[{
        "topLeft": [8, 8], "bottomRight": [24, 28],
        "landmarks": [[12,14],[20,14],[16,18],[18,22],[14,22]],
        "probability": [0.9]
    }]"#;

    fn write_snapshot(dir: &Path) {
        let img = RgbImage::from_pixel(32, 32, Rgb([100, 120, 140]));
        img.save(dir.join("frame.png")).unwrap();
        std::fs::write(dir.join("detections.json"), DETECTIONS).unwrap();
    }

    #[test]
    fn test_snapshot_dir_capture() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(dir.path());

        let source = SnapshotDirSource::new(dir.path(), "frame.png", "detections.json");
        let captured = source.capture().unwrap();
        assert_eq!((captured.frame.width(), captured.frame.height()), (32, 32));
        assert_eq!(captured.detections.len(), 1);
        assert_eq!(captured.detections[0].bottom_right, (24.0, 28.0));
    }

    #[test]
    fn test_missing_frame_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = SnapshotDirSource::new(dir.path(), "frame.png", "detections.json");
        assert!(matches!(source.capture(), Err(SourceError::Io { .. })));
    }

    #[test]
    fn test_corrupt_frame_is_image_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frame.png"), b"not a png").unwrap();
        assert!(matches!(
            load_frame(&dir.path().join("frame.png")),
            Err(SourceError::Image { .. })
        ));
    }

    #[test]
    fn test_blank_detections_are_empty() {
        assert!(parse_detections_or_empty("  \n").unwrap().is_empty());
        assert!(matches!(
            parse_detections_or_empty("{"),
            Err(SourceError::Detections(_))
        ));
    }
}
