use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One face located by the external detector.
///
/// Field names and layout follow the detector's JSON output:
/// `{"topLeft":[x,y],"bottomRight":[x,y],"landmarks":[[x,y],…],"probability":p}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub top_left: (f32, f32),
    pub bottom_right: (f32, f32),
    /// Five-point landmarks: [left_eye, right_eye, nose, mouth_right, mouth_left].
    #[serde(default)]
    pub landmarks: Vec<(f32, f32)>,
    /// Detector confidence in [0, 1].
    #[serde(deserialize_with = "deserialize_probability")]
    pub probability: f32,
}

impl Detection {
    pub fn width(&self) -> f32 {
        self.bottom_right.0 - self.top_left.0
    }

    pub fn height(&self) -> f32 {
        self.bottom_right.1 - self.top_left.1
    }

    /// Bounding box area; zero for degenerate boxes.
    pub fn area(&self) -> f32 {
        (self.width().max(0.0)) * (self.height().max(0.0))
    }
}

/// The browser model reports `probability` as a one-element tensor,
/// other producers as a bare number.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawProbability {
    Scalar(f32),
    Wrapped([f32; 1]),
}

fn deserialize_probability<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawProbability::deserialize(deserializer)? {
        RawProbability::Scalar(p) => p,
        RawProbability::Wrapped([p]) => p,
    })
}

/// Parse the detector's JSON array of detections.
pub fn parse_detections(json: &str) -> Result<Vec<Detection>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Emotions reported by the classifier, in declaration (tie-break) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Emotion {
    Happy,
    Sad,
    Surprised,
    Neutral,
}

impl Emotion {
    pub const ALL: [Emotion; 4] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprised,
        Emotion::Neutral,
    ];
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Surprised => "Surprised",
            Emotion::Neutral => "Neutral",
        };
        f.write_str(name)
    }
}

/// Normalized emotion distribution. Serializes as `{"Happy": p, …}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmotionProbabilities {
    pub happy: f64,
    pub sad: f64,
    pub surprised: f64,
    pub neutral: f64,
}

impl EmotionProbabilities {
    pub fn get(&self, emotion: Emotion) -> f64 {
        match emotion {
            Emotion::Happy => self.happy,
            Emotion::Sad => self.sad,
            Emotion::Surprised => self.surprised,
            Emotion::Neutral => self.neutral,
        }
    }

    /// (emotion, probability) pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f64)> + '_ {
        Emotion::ALL.iter().map(move |&e| (e, self.get(e)))
    }

    pub fn sum(&self) -> f64 {
        self.happy + self.sad + self.surprised + self.neutral
    }
}

/// Heuristic feature/emotion summary for one detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSummary {
    pub estimated_age: u32,
    pub dominant_emotion: Emotion,
    pub emotion_probabilities: EmotionProbabilities,
    pub feature_descriptions: Vec<String>,
    /// Detector confidence of the summarized face.
    pub confidence: f32,
}

/// Result of matching a probe thumbnail against the enrollment store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Label of the accepted match; `None` when nothing cleared the threshold.
    pub label: Option<String>,
    /// Similarity of the accepted match in [0, 1]; 0 when there is no match.
    pub score: f32,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self {
            label: None,
            score: 0.0,
        }
    }

    pub fn matched(&self) -> bool {
        self.label.is_some()
    }
}
