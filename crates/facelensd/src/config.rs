use facelens_core::{SelectionPolicy, ACCEPTANCE_THRESHOLD};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Daemon configuration: defaults, then an optional TOML file named by
/// `FACELENS_CONFIG`, then `FACELENS_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory the UI layer writes the current frame and detections into.
    pub snapshot_dir: PathBuf,
    pub frame_file: String,
    pub detections_file: String,
    /// Similarity a match must exceed.
    pub acceptance_threshold: f32,
    /// Period of recognition mode.
    pub recognition_interval_ms: u64,
    /// Which detection to analyze when several faces are found.
    pub detection_policy: SelectionPolicy,
    /// Seed for the age jitter; entropy-seeded when unset.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());

        Self {
            snapshot_dir: runtime_dir.join("facelens"),
            frame_file: "frame.png".to_string(),
            detections_file: "detections.json".to_string(),
            acceptance_threshold: ACCEPTANCE_THRESHOLD,
            recognition_interval_ms: 1000,
            detection_policy: SelectionPolicy::First,
            seed: None,
        }
    }
}

impl Config {
    /// Load configuration from the optional file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("FACELENS_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if !valid_threshold(config.acceptance_threshold) {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                reason: format!(
                    "acceptance_threshold must be within [0, 1], got {}",
                    config.acceptance_threshold
                ),
            });
        }
        Ok(config)
    }

    /// Override fields from `FACELENS_*` variables. Unparseable values are
    /// logged and ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("FACELENS_SNAPSHOT_DIR") {
            self.snapshot_dir = PathBuf::from(dir);
        }
        if let Some(name) = lookup("FACELENS_FRAME_FILE") {
            self.frame_file = name;
        }
        if let Some(name) = lookup("FACELENS_DETECTIONS_FILE") {
            self.detections_file = name;
        }
        if let Some(v) = env_parse::<f32, _>(&lookup, "FACELENS_ACCEPTANCE_THRESHOLD") {
            if valid_threshold(v) {
                self.acceptance_threshold = v;
            } else {
                tracing::warn!(
                    key = "FACELENS_ACCEPTANCE_THRESHOLD",
                    value = v,
                    "ignoring threshold outside [0, 1]"
                );
            }
        }
        if let Some(v) = env_parse(&lookup, "FACELENS_RECOGNITION_INTERVAL_MS") {
            self.recognition_interval_ms = v;
        }
        if let Some(v) = env_parse(&lookup, "FACELENS_DETECTION_POLICY") {
            self.detection_policy = v;
        }
        if let Some(v) = env_parse(&lookup, "FACELENS_SEED") {
            self.seed = Some(v);
        }
    }

    pub fn recognition_interval(&self) -> Duration {
        // tokio's interval panics on a zero period
        Duration::from_millis(self.recognition_interval_ms.max(1))
    }
}

/// Similarity scores live in [0, 1].
fn valid_threshold(v: f32) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

fn env_parse<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "ignoring invalid environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.acceptance_threshold, 0.75);
        assert_eq!(config.recognition_interval(), Duration::from_secs(1));
        assert_eq!(config.detection_policy, SelectionPolicy::First);
        assert_eq!(config.frame_file, "frame.png");
        assert!(config.snapshot_dir.ends_with("facelens"));
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(lookup_from(&[
            ("FACELENS_SNAPSHOT_DIR", "/run/cam"),
            ("FACELENS_ACCEPTANCE_THRESHOLD", "0.8"),
            ("FACELENS_RECOGNITION_INTERVAL_MS", "250"),
            ("FACELENS_DETECTION_POLICY", "highest-confidence"),
            ("FACELENS_SEED", "42"),
        ]));
        assert_eq!(config.snapshot_dir, PathBuf::from("/run/cam"));
        assert_eq!(config.acceptance_threshold, 0.8);
        assert_eq!(config.recognition_interval(), Duration::from_millis(250));
        assert_eq!(config.detection_policy, SelectionPolicy::HighestConfidence);
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn test_invalid_env_value_keeps_previous() {
        let mut config = Config::default();
        config.apply_env(lookup_from(&[
            ("FACELENS_ACCEPTANCE_THRESHOLD", "high"),
            ("FACELENS_DETECTION_POLICY", "biggest"),
        ]));
        assert_eq!(config.acceptance_threshold, 0.75);
        assert_eq!(config.detection_policy, SelectionPolicy::First);
    }

    #[test]
    fn test_out_of_range_threshold_keeps_previous() {
        for bad in ["NaN", "-1", "1.5", "inf"] {
            let mut config = Config::default();
            config.apply_env(lookup_from(&[("FACELENS_ACCEPTANCE_THRESHOLD", bad)]));
            assert_eq!(config.acceptance_threshold, 0.75, "accepted {bad}");
        }

        let mut config = Config::default();
        config.apply_env(lookup_from(&[("FACELENS_ACCEPTANCE_THRESHOLD", "0")]));
        assert_eq!(config.acceptance_threshold, 0.0);
    }

    #[test]
    fn test_toml_out_of_range_threshold_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facelens.toml");
        for bad in ["nan", "-1.0", "1.5"] {
            std::fs::write(&path, format!("acceptance_threshold = {bad}\n")).unwrap();
            assert!(
                matches!(Config::from_file(&path), Err(ConfigError::Invalid { .. })),
                "accepted {bad}"
            );
        }
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = Config {
            recognition_interval_ms: 0,
            ..Config::default()
        };
        assert_eq!(config.recognition_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_toml_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facelens.toml");
        std::fs::write(
            &path,
            "acceptance_threshold = 0.9\ndetection_policy = \"largest\"\nseed = 7\n",
        )
        .unwrap();

        let mut config = Config::from_file(&path).unwrap();
        assert_eq!(config.acceptance_threshold, 0.9);
        assert_eq!(config.detection_policy, SelectionPolicy::Largest);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.frame_file, "frame.png");

        config.apply_env(lookup_from(&[("FACELENS_ACCEPTANCE_THRESHOLD", "0.6")]));
        assert_eq!(config.acceptance_threshold, 0.6);
    }

    #[test]
    fn test_toml_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facelens.toml");
        std::fs::write(&path, "threshold = 0.9\n").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse { .. })));
    }
}
