//! Landmark geometry — normalized distances derived from a detection.

use crate::types::Detection;
use thiserror::Error;

const LANDMARK_COUNT: usize = 5;

// Landmark order as emitted by the detector.
const LEFT_EYE: usize = 0;
const RIGHT_EYE: usize = 1;
const NOSE: usize = 2;
const MOUTH_RIGHT: usize = 3;
const MOUTH_LEFT: usize = 4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidDetection {
    #[error("degenerate bounding box: {width}x{height}")]
    DegenerateBox { width: f32, height: f32 },
    #[error("expected 5 landmarks, got {0}")]
    MissingLandmarks(usize),
    #[error("landmark {0} has a non-finite coordinate")]
    NonFiniteLandmark(usize),
    #[error("bounding box does not intersect the {frame_width}x{frame_height} frame")]
    OutsideFrame { frame_width: u32, frame_height: u32 },
}

/// Geometry of one face, in frame pixels except where noted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceGeometry {
    pub face_width: f32,
    pub face_height: f32,
    pub eye_distance: f32,
    /// Vertical eye-to-nose distance over face height.
    pub eye_to_nose_ratio: f32,
    pub mouth_width: f32,
    /// Vertical mouth-to-nose distance over face height.
    pub mouth_to_nose_ratio: f32,
    /// Vertical offset between the two mouth corners.
    pub mouth_height: f32,
    pub nose_y: f32,
}

impl FaceGeometry {
    /// Validate a detection and compute its geometry.
    ///
    /// Rejects boxes with non-positive (or non-finite) width/height and any
    /// landmark set that is not exactly five finite points; every ratio
    /// below divides by the face height.
    pub fn from_detection(detection: &Detection) -> Result<Self, InvalidDetection> {
        let face_width = detection.width();
        let face_height = detection.height();
        if !(face_width.is_finite() && face_height.is_finite())
            || face_width <= 0.0
            || face_height <= 0.0
        {
            return Err(InvalidDetection::DegenerateBox {
                width: face_width,
                height: face_height,
            });
        }

        let lm = detection.landmarks.as_slice();
        if lm.len() != LANDMARK_COUNT {
            return Err(InvalidDetection::MissingLandmarks(lm.len()));
        }
        if let Some(i) = lm.iter().position(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(InvalidDetection::NonFiniteLandmark(i));
        }

        Ok(Self {
            face_width,
            face_height,
            eye_distance: (lm[RIGHT_EYE].0 - lm[LEFT_EYE].0).abs(),
            eye_to_nose_ratio: (lm[NOSE].1 - lm[LEFT_EYE].1).abs() / face_height,
            mouth_width: (lm[MOUTH_RIGHT].0 - lm[MOUTH_LEFT].0).abs(),
            mouth_to_nose_ratio: (lm[MOUTH_RIGHT].1 - lm[NOSE].1).abs() / face_height,
            mouth_height: (lm[MOUTH_RIGHT].1 - lm[MOUTH_LEFT].1).abs(),
            nose_y: lm[NOSE].1,
        })
    }

    /// Face width over face height.
    pub fn face_ratio(&self) -> f32 {
        self.face_width / self.face_height
    }

    /// Eye distance over face width.
    pub fn eye_ratio(&self) -> f32 {
        self.eye_distance / self.face_width
    }

    /// Mouth width over face width.
    pub fn mouth_ratio(&self) -> f32 {
        self.mouth_width / self.face_width
    }
}
