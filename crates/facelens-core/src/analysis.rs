//! One capture-and-analyze cycle: pick a face, summarize it, match it.

use crate::geometry::InvalidDetection;
use crate::heuristics;
use crate::matcher::{MatchError, Matcher};
use crate::store::EnrollmentStore;
use crate::thumbnail::{Thumbnail, ThumbnailError};
use crate::types::{Detection, FeatureSummary, MatchResult};
use image::DynamicImage;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("invalid detection: {0}")]
    InvalidDetection(#[from] InvalidDetection),
    #[error("probe crop failed: {0}")]
    Probe(#[from] ThumbnailError),
    #[error(transparent)]
    Match(#[from] MatchError),
}

/// Which detection to analyze when the detector returns several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// Whatever the detector returned first.
    #[default]
    First,
    #[serde(alias = "confidence")]
    HighestConfidence,
    /// Largest bounding-box area.
    Largest,
}

impl SelectionPolicy {
    /// Index of the chosen detection; ties keep the earlier index.
    pub fn select(&self, detections: &[Detection]) -> Option<usize> {
        if detections.is_empty() {
            return None;
        }
        let key: fn(&Detection) -> f32 = match self {
            SelectionPolicy::First => return Some(0),
            SelectionPolicy::HighestConfidence => |d: &Detection| d.probability,
            SelectionPolicy::Largest => Detection::area,
        };

        let mut best = 0;
        let mut best_key = key(&detections[0]);
        for (i, det) in detections.iter().enumerate().skip(1) {
            let k = key(det);
            if k > best_key {
                best = i;
                best_key = k;
            }
        }
        Some(best)
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SelectionPolicy::First => "first",
            SelectionPolicy::HighestConfidence => "highest-confidence",
            SelectionPolicy::Largest => "largest",
        })
    }
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(SelectionPolicy::First),
            "highest-confidence" | "confidence" => Ok(SelectionPolicy::HighestConfidence),
            "largest" => Ok(SelectionPolicy::Largest),
            other => Err(format!("unknown detection policy: {other}")),
        }
    }
}

/// Result of analyzing one frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    /// Index into the detector output of the face that was analyzed.
    pub detection_index: usize,
    pub features: FeatureSummary,
    #[serde(rename = "match")]
    pub match_result: MatchResult,
}

/// Analyze one frame given the external detector's output.
///
/// Fails fast on an invalid detection before any cropping or matching.
pub fn analyze<M, R>(
    frame: &DynamicImage,
    detections: &[Detection],
    store: &EnrollmentStore,
    matcher: &M,
    policy: SelectionPolicy,
    rng: &mut R,
) -> Result<Analysis, AnalysisError>
where
    M: Matcher + ?Sized,
    R: Rng + ?Sized,
{
    let detection_index = policy
        .select(detections)
        .ok_or(AnalysisError::NoFaceDetected)?;
    let detection = &detections[detection_index];

    let features = heuristics::summarize(detection, rng)?;
    let probe = Thumbnail::crop_from_frame(frame, detection)?;
    let match_result = matcher.match_store(&probe, store)?;

    tracing::debug!(
        detection_index,
        faces = detections.len(),
        age = features.estimated_age,
        emotion = %features.dominant_emotion,
        matched = ?match_result.label,
        "frame analyzed"
    );

    Ok(Analysis {
        detection_index,
        features,
        match_result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::tests::reference_detection;
    use crate::matcher::PixelDiffMatcher;
    use crate::types::Emotion;
    use image::{Rgb, RgbImage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn det(x: f32, size: f32, probability: f32) -> Detection {
        let mut d = reference_detection();
        d.top_left = (x, 0.0);
        d.bottom_right = (x + size, size);
        d.probability = probability;
        d
    }

    /// Frame whose face region is a gradient over a flat background.
    fn frame() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(320, 320, |x, y| {
            if (80..200).contains(&x) && (100..260).contains(&y) {
                Rgb([(x - 80) as u8 * 2, (y - 100) as u8, 200])
            } else {
                Rgb([30, 30, 30])
            }
        }))
    }

    #[test]
    fn test_select_empty() {
        assert_eq!(SelectionPolicy::First.select(&[]), None);
        assert_eq!(SelectionPolicy::Largest.select(&[]), None);
    }

    #[test]
    fn test_select_policies() {
        let dets = vec![det(0.0, 50.0, 0.7), det(100.0, 90.0, 0.8), det(300.0, 40.0, 0.95)];
        assert_eq!(SelectionPolicy::First.select(&dets), Some(0));
        assert_eq!(SelectionPolicy::HighestConfidence.select(&dets), Some(2));
        assert_eq!(SelectionPolicy::Largest.select(&dets), Some(1));
    }

    #[test]
    fn test_select_ties_keep_earlier() {
        let dets = vec![det(0.0, 50.0, 0.9), det(100.0, 50.0, 0.9)];
        assert_eq!(SelectionPolicy::HighestConfidence.select(&dets), Some(0));
        assert_eq!(SelectionPolicy::Largest.select(&dets), Some(0));
    }

    #[test]
    fn test_policy_parse_roundtrip() {
        for p in [
            SelectionPolicy::First,
            SelectionPolicy::HighestConfidence,
            SelectionPolicy::Largest,
        ] {
            assert_eq!(p.to_string().parse::<SelectionPolicy>().unwrap(), p);
        }
        assert!("biggest".parse::<SelectionPolicy>().is_err());
    }

    #[test]
    fn test_policy_aliases_agree_with_serde() {
        for name in ["first", "highest-confidence", "confidence", "largest"] {
            let parsed: SelectionPolicy = name.parse().unwrap();
            let deserialized: SelectionPolicy = serde_json::from_value(serde_json::json!(name)).unwrap();
            assert_eq!(parsed, deserialized, "{name}");
        }
    }

    #[test]
    fn test_analyze_no_detections() {
        let store = EnrollmentStore::new();
        let mut rng = StdRng::seed_from_u64(0);
        let err = analyze(&frame(), &[], &store, &PixelDiffMatcher::default(), SelectionPolicy::First, &mut rng)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NoFaceDetected));
    }

    #[test]
    fn test_analyze_rejects_invalid_detection() {
        let store = EnrollmentStore::new();
        let mut bad = reference_detection();
        bad.landmarks.pop();
        let mut rng = StdRng::seed_from_u64(0);
        let err = analyze(&frame(), &[bad], &store, &PixelDiffMatcher::default(), SelectionPolicy::First, &mut rng)
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InvalidDetection(InvalidDetection::MissingLandmarks(4))
        ));
    }

    #[test]
    fn test_analyze_empty_store() {
        let store = EnrollmentStore::new();
        let mut rng = StdRng::seed_from_u64(5);
        let analysis = analyze(
            &frame(),
            &[reference_detection()],
            &store,
            &PixelDiffMatcher::default(),
            SelectionPolicy::First,
            &mut rng,
        )
        .unwrap();
        assert_eq!(analysis.detection_index, 0);
        assert_eq!(analysis.match_result, MatchResult::no_match());
        assert!((29..=33).contains(&analysis.features.estimated_age));
        assert_eq!(analysis.features.dominant_emotion, Emotion::Neutral);
    }

    #[test]
    fn test_analyze_recognizes_enrolled_face() {
        let frame = frame();
        let detection = reference_detection();
        let mut store = EnrollmentStore::new();
        store.enroll("Alice", Thumbnail::crop_from_frame(&frame, &detection).unwrap()).unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        let analysis = analyze(
            &frame,
            &[detection],
            &store,
            &PixelDiffMatcher::default(),
            SelectionPolicy::First,
            &mut rng,
        )
        .unwrap();
        assert_eq!(analysis.match_result.label.as_deref(), Some("Alice"));
        assert!(analysis.match_result.score >= 0.99);
    }

    #[test]
    fn test_analysis_serializes_match_key() {
        let store = EnrollmentStore::new();
        let mut rng = StdRng::seed_from_u64(5);
        let analysis = analyze(
            &frame(),
            &[reference_detection()],
            &store,
            &PixelDiffMatcher::default(),
            SelectionPolicy::First,
            &mut rng,
        )
        .unwrap();
        let v = serde_json::to_value(&analysis).unwrap();
        assert_eq!(v["detectionIndex"], 0);
        assert!(v["match"]["label"].is_null());
        assert_eq!(v["features"]["dominantEmotion"], "Neutral");
    }
}
