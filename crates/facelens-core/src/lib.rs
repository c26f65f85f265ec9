//! facelens-core: heuristic face analysis and thumbnail matching.
//!
//! Face detection is external: this crate consumes detections (bounding box,
//! five landmarks, confidence), derives landmark-ratio age and emotion
//! estimates, and matches cropped face thumbnails against an in-memory
//! enrollment store using a pixel-difference similarity.

pub mod analysis;
pub mod geometry;
pub mod heuristics;
pub mod matcher;
pub mod store;
pub mod thumbnail;
pub mod types;

pub use analysis::{analyze, Analysis, AnalysisError, SelectionPolicy};
pub use geometry::{FaceGeometry, InvalidDetection};
pub use matcher::{MatchError, Matcher, PixelDiffMatcher, ACCEPTANCE_THRESHOLD};
pub use store::{EnrollmentRecord, EnrollmentStore, StoreError};
pub use thumbnail::{Thumbnail, ThumbnailError};
pub use types::{parse_detections, Detection, Emotion, EmotionProbabilities, FeatureSummary, MatchResult};
