//! Landmark-ratio heuristics for age and emotion.
//!
//! These are fixed linear thresholds over [`FaceGeometry`], not learned
//! models. The age estimator adds a bounded jitter drawn from a caller
//! supplied random source; the emotion path is fully deterministic.

use crate::geometry::{FaceGeometry, InvalidDetection};
use crate::types::{Detection, Emotion, EmotionProbabilities, FeatureSummary};
use rand::Rng;

// --- Age policy ---
const BASE_AGE: f32 = 30.0;
const MIN_AGE: f32 = 15.0;
const MAX_AGE: f32 = 75.0;
const AGE_JITTER: f32 = 2.0;

// --- Emotion policy ---
const HAPPY_MOUTH_RATIO: f64 = 2.0;
const SAD_MOUTH_RATIO: f64 = 1.5;
/// Absolute pixels, so this rule depends on capture resolution.
const SURPRISED_EYE_DISTANCE: f64 = 100.0;
const HAPPY_SCORE: f64 = 0.6;
const SAD_SCORE: f64 = 0.5;
const SURPRISED_SCORE: f64 = 0.7;
const BASELINE_SCORE: f64 = 0.2;

/// The five ratios the age estimator reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgeRatios {
    /// Face width over face height.
    pub face_ratio: f32,
    /// Eye distance over face width.
    pub eye_ratio: f32,
    pub eye_to_nose_ratio: f32,
    /// Mouth width over face width.
    pub mouth_ratio: f32,
    pub mouth_to_nose_ratio: f32,
}

impl AgeRatios {
    pub fn from_geometry(g: &FaceGeometry) -> Self {
        Self {
            face_ratio: g.face_ratio(),
            eye_ratio: g.eye_ratio(),
            eye_to_nose_ratio: g.eye_to_nose_ratio,
            mouth_ratio: g.mouth_ratio(),
            mouth_to_nose_ratio: g.mouth_to_nose_ratio,
        }
    }
}

/// Estimate an age in [15, 75] from facial proportions.
///
/// Starts at 30 and applies one adjustment per threshold rule, then adds a
/// uniform jitter in [-2, +2] from `rng`. A NaN ratio fails both of its
/// comparisons and so contributes no adjustment.
pub fn estimate_age<R: Rng + ?Sized>(ratios: &AgeRatios, rng: &mut R) -> u32 {
    let mut age = BASE_AGE;

    if ratios.face_ratio > 0.85 {
        age -= 5.0;
    }
    if ratios.face_ratio < 0.75 {
        age += 5.0;
    }

    if ratios.eye_ratio > 0.3 {
        age -= 3.0;
    }
    if ratios.eye_ratio < 0.25 {
        age += 3.0;
    }

    if ratios.eye_to_nose_ratio > 0.4 {
        age -= 4.0;
    }
    if ratios.eye_to_nose_ratio < 0.35 {
        age += 4.0;
    }

    if ratios.mouth_ratio > 0.5 {
        age -= 2.0;
    }
    if ratios.mouth_to_nose_ratio > 0.6 {
        age -= 3.0;
    }

    age += rng.gen_range(-AGE_JITTER..=AGE_JITTER);

    age.clamp(MIN_AGE, MAX_AGE).round() as u32
}

/// Normalized emotion distribution plus its arg-max.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmotionEstimate {
    pub dominant: Emotion,
    pub probabilities: EmotionProbabilities,
}

/// Classify emotion from mouth shape and eye spacing.
///
/// A zero-height mouth makes the width/height ratio undefined; that case
/// reports Neutral with probability 1.
pub fn classify_emotion(mouth_width: f32, mouth_height: f32, eye_distance: f32) -> EmotionEstimate {
    let mouth_ratio = f64::from(mouth_width) / f64::from(mouth_height);
    if mouth_height == 0.0 || !mouth_ratio.is_finite() {
        return EmotionEstimate {
            dominant: Emotion::Neutral,
            probabilities: EmotionProbabilities {
                happy: 0.0,
                sad: 0.0,
                surprised: 0.0,
                neutral: 1.0,
            },
        };
    }

    let happy = if mouth_ratio > HAPPY_MOUTH_RATIO {
        HAPPY_SCORE
    } else {
        BASELINE_SCORE
    };
    let sad = if mouth_ratio < SAD_MOUTH_RATIO {
        SAD_SCORE
    } else {
        BASELINE_SCORE
    };
    let surprised = if f64::from(eye_distance) > SURPRISED_EYE_DISTANCE {
        SURPRISED_SCORE
    } else {
        BASELINE_SCORE
    };
    let neutral = BASELINE_SCORE;

    let total = happy + sad + surprised + neutral;
    let probabilities = EmotionProbabilities {
        happy: happy / total,
        sad: sad / total,
        surprised: surprised / total,
        neutral: neutral / total,
    };

    EmotionEstimate {
        dominant: dominant_emotion(&probabilities),
        probabilities,
    }
}

/// Strict arg-max; the earliest emotion in declaration order wins ties.
fn dominant_emotion(probabilities: &EmotionProbabilities) -> Emotion {
    let mut best = Emotion::Happy;
    let mut best_p = f64::NEG_INFINITY;
    for (emotion, p) in probabilities.iter() {
        if p > best_p {
            best = emotion;
            best_p = p;
        }
    }
    best
}

/// Human-readable feature lines, in display order.
pub fn describe_features(g: &FaceGeometry) -> Vec<String> {
    vec![
        format!("Eye Distance: {:.2}", g.eye_ratio()),
        format!("Face Width: {:.0}px", g.face_width),
        format!("Face Height: {:.0}px", g.face_height),
        format!("Nose Position: {:.0}px", g.nose_y),
        format!("Mouth Width: {:.0}px", g.mouth_width),
    ]
}

/// Compute the full feature summary for one detection.
pub fn summarize<R: Rng + ?Sized>(
    detection: &Detection,
    rng: &mut R,
) -> Result<FeatureSummary, InvalidDetection> {
    let geometry = FaceGeometry::from_detection(detection)?;
    let estimated_age = estimate_age(&AgeRatios::from_geometry(&geometry), rng);
    let emotion = classify_emotion(
        geometry.mouth_width,
        geometry.mouth_height,
        geometry.eye_distance,
    );

    Ok(FeatureSummary {
        estimated_age,
        dominant_emotion: emotion.dominant,
        emotion_probabilities: emotion.probabilities,
        feature_descriptions: describe_features(&geometry),
        confidence: detection.probability,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::tests::reference_detection;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ratios(face: f32, eye: f32, eye_nose: f32, mouth: f32, mouth_nose: f32) -> AgeRatios {
        AgeRatios {
            face_ratio: face,
            eye_ratio: eye,
            eye_to_nose_ratio: eye_nose,
            mouth_ratio: mouth,
            mouth_to_nose_ratio: mouth_nose,
        }
    }

    #[test]
    fn test_age_always_in_bounds() {
        let samples = [0.0, 0.1, 0.25, 0.3, 0.35, 0.4, 0.5, 0.6, 0.75, 0.85, 1.0, 5.0];
        let mut rng = StdRng::seed_from_u64(7);
        for &face in &samples {
            for &eye in &samples {
                for &eye_nose in &samples {
                    for &mouth in &samples {
                        for &mouth_nose in &samples {
                            let r = ratios(face, eye, eye_nose, mouth, mouth_nose);
                            let age = estimate_age(&r, &mut rng);
                            assert!((15..=75).contains(&age), "age {age} for {r:?}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_age_youngest_and_oldest_rules() {
        let mut rng = StdRng::seed_from_u64(1);
        // 30 - 5 - 3 - 4 - 2 - 3 = 13 before jitter; clamps to 15 at most 15.
        let young = ratios(1.0, 0.5, 0.5, 0.6, 0.7);
        for _ in 0..50 {
            assert_eq!(estimate_age(&young, &mut rng), 15);
        }
        // 30 + 5 + 3 + 4 = 42 ± 2
        let old = ratios(0.5, 0.1, 0.1, 0.1, 0.1);
        for _ in 0..50 {
            let age = estimate_age(&old, &mut rng);
            assert!((40..=44).contains(&age), "age {age}");
        }
    }

    #[test]
    fn test_age_seeded_is_reproducible() {
        let r = ratios(0.8, 0.27, 0.37, 0.3, 0.3);
        let a = estimate_age(&r, &mut StdRng::seed_from_u64(42));
        let b = estimate_age(&r, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
        assert!((28..=32).contains(&a));
    }

    #[test]
    fn test_age_nan_ratio_adds_nothing() {
        let r = ratios(f32::NAN, 0.27, 0.37, 0.3, 0.3);
        let age = estimate_age(&r, &mut StdRng::seed_from_u64(3));
        assert!((28..=32).contains(&age));
    }

    #[test]
    fn test_emotion_happy() {
        // ratio 3 > 2, eyes close together
        let e = classify_emotion(30.0, 10.0, 50.0);
        assert_eq!(e.dominant, Emotion::Happy);
        // 0.6 / (0.6 + 0.2 + 0.2 + 0.2)
        assert!((e.probabilities.happy - 0.5).abs() < 1e-9);
        assert!((e.probabilities.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_emotion_sad() {
        let e = classify_emotion(10.0, 10.0, 50.0);
        assert_eq!(e.dominant, Emotion::Sad);
        // 0.5 / (0.2 + 0.5 + 0.2 + 0.2)
        assert!((e.probabilities.sad - 0.5 / 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_emotion_surprised_beats_happy() {
        let e = classify_emotion(30.0, 10.0, 120.0);
        assert_eq!(e.dominant, Emotion::Surprised);
        assert!((e.probabilities.surprised - 0.7 / 1.7).abs() < 1e-9);
    }

    #[test]
    fn test_emotion_tie_goes_to_first_declared() {
        // ratio 1.75: neither happy nor sad; all four scores are 0.2.
        let e = classify_emotion(17.5, 10.0, 50.0);
        assert_eq!(e.dominant, Emotion::Happy);
        for (_, p) in e.probabilities.iter() {
            assert!((p - 0.25).abs() < 1e-9);
        }
    }

    #[test]
    fn test_emotion_zero_mouth_height_is_neutral() {
        let e = classify_emotion(20.0, 0.0, 150.0);
        assert_eq!(e.dominant, Emotion::Neutral);
        assert_eq!(e.probabilities.neutral, 1.0);
        assert!((e.probabilities.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_emotion_probabilities_sum_to_one() {
        for &w in &[1.0, 5.0, 14.0, 15.0, 20.0, 21.0, 80.0] {
            for &eye in &[10.0, 100.0, 101.0, 300.0] {
                let e = classify_emotion(w, 10.0, eye);
                assert!((e.probabilities.sum() - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_describe_reference_features() {
        let g = FaceGeometry::from_detection(&reference_detection()).unwrap();
        assert_eq!(
            describe_features(&g),
            vec![
                "Eye Distance: 0.50",
                "Face Width: 120px",
                "Face Height: 160px",
                "Nose Position: 180px",
                "Mouth Width: 20px",
            ]
        );
    }

    #[test]
    fn test_summarize_reference_detection() {
        let mut rng = StdRng::seed_from_u64(9);
        let summary = summarize(&reference_detection(), &mut rng).unwrap();
        // face 0.75 (no rule), eye 0.5 (-3), eye/nose 0.1875 (+4): 31 ± 2
        assert!((29..=33).contains(&summary.estimated_age));
        // mouth corners share a y coordinate, so the mouth height is zero
        assert_eq!(summary.dominant_emotion, Emotion::Neutral);
        assert_eq!(summary.emotion_probabilities.neutral, 1.0);
        assert_eq!(summary.feature_descriptions.len(), 5);
        assert!((summary.confidence - 0.97).abs() < 1e-6);
    }

    #[test]
    fn test_summarize_rejects_invalid() {
        let mut det = reference_detection();
        det.landmarks.clear();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(summarize(&det, &mut rng).is_err());
    }
}
