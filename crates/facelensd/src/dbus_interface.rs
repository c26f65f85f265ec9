use crate::engine::{EngineError, EngineHandle, EngineSettings};
use crate::frame_source::{load_frame, parse_detections_or_empty, CapturedFrame};
use crate::recognition::RecognitionMode;
use facelens_core::{AnalysisError, ThumbnailError};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tokio::runtime::Handle;
use zbus::interface;

pub const BUS_NAME: &str = "org.facelens.Analyzer1";
pub const OBJECT_PATH: &str = "/org/facelens/Analyzer1";

/// D-Bus interface for the facelens session daemon.
///
/// Bus name: org.facelens.Analyzer1
/// Object path: /org/facelens/Analyzer1
///
/// Every method returns JSON so the CLI can print it as-is.
pub struct AnalyzerService {
    runtime: Handle,
    engine: EngineHandle,
    recognition: Mutex<RecognitionMode>,
    settings: EngineSettings,
    snapshot_dir: PathBuf,
}

impl AnalyzerService {
    pub fn new(
        runtime: Handle,
        engine: EngineHandle,
        recognition: RecognitionMode,
        settings: EngineSettings,
        snapshot_dir: PathBuf,
    ) -> Self {
        Self {
            runtime,
            engine,
            recognition: Mutex::new(recognition),
            settings,
            snapshot_dir,
        }
    }

    fn recognition(&self) -> MutexGuard<'_, RecognitionMode> {
        self.recognition.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Decode `image_path` off the D-Bus executor and pair it with the
    /// caller's detections.
    async fn load_capture(&self, image_path: &str, detections_json: &str) -> Result<CapturedFrame, EngineError> {
        let detections = parse_detections_or_empty(detections_json)?;
        let path = PathBuf::from(image_path);
        let frame = self
            .runtime
            .spawn_blocking(move || load_frame(&path))
            .await
            .map_err(EngineError::LoadTask)??;
        Ok(CapturedFrame { frame, detections })
    }

    pub async fn enroll_json(&self, label: &str, image_path: &str, detections_json: &str) -> Result<String, EngineError> {
        let capture = self.load_capture(image_path, detections_json).await?;
        let record = self.engine.enroll(label.to_string(), capture).await?;
        Ok(to_json(&record))
    }

    pub async fn analyze_json(&self, frame_path: &str, detections_json: &str) -> Result<String, EngineError> {
        let capture = self.load_capture(frame_path, detections_json).await?;
        let analysis = self.engine.analyze(capture).await?;
        Ok(to_json(&analysis))
    }

    pub async fn list_json(&self) -> Result<String, EngineError> {
        Ok(to_json(&self.engine.list().await?))
    }

    pub async fn status_json(&self) -> Result<String, EngineError> {
        let enrolled = self.engine.list().await?.len();
        let recognition = self.recognition();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "enrolled": enrolled,
            "recognition_running": recognition.is_running(),
            "recognition_generation": recognition.generation(),
            "acceptance_threshold": self.settings.acceptance_threshold,
            "detection_policy": self.settings.detection_policy.to_string(),
            "snapshot_dir": self.snapshot_dir.display().to_string(),
        })
        .to_string())
    }
}

#[interface(name = "org.facelens.Analyzer1")]
impl AnalyzerService {
    /// Enroll `label` from an image file. With detections, the selected face
    /// is cropped; with an empty string the whole image is enrolled.
    async fn enroll(&self, label: &str, image_path: &str, detections_json: &str) -> zbus::fdo::Result<String> {
        tracing::info!(label, image_path, "enroll requested");
        self.enroll_json(label, image_path, detections_json)
            .await
            .map_err(to_fdo)
    }

    /// Analyze one frame file against the enrolled faces.
    async fn analyze(&self, frame_path: &str, detections_json: &str) -> zbus::fdo::Result<String> {
        tracing::debug!(frame_path, "analyze requested");
        self.analyze_json(frame_path, detections_json).await.map_err(to_fdo)
    }

    /// List enrolled labels with their enrollment time.
    async fn list_enrolled(&self) -> zbus::fdo::Result<String> {
        self.list_json().await.map_err(to_fdo)
    }

    async fn start_recognition(&self) -> bool {
        self.recognition().start()
    }

    async fn stop_recognition(&self) -> bool {
        self.recognition().stop()
    }

    /// Latest recognition event, or `null` if none has been published.
    async fn latest_recognition(&self) -> String {
        to_json(&self.recognition().latest())
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        self.status_json().await.map_err(to_fdo)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize reply");
        "null".to_string()
    })
}

/// Caller mistakes become `InvalidArgs`; everything else is `Failed`.
fn to_fdo(err: EngineError) -> zbus::fdo::Error {
    let msg = err.to_string();
    match err {
        EngineError::Store(_)
        | EngineError::InvalidDetection(_)
        | EngineError::Source(_)
        | EngineError::Thumbnail(ThumbnailError::InvalidDetection(_))
        | EngineError::Analysis(
            AnalysisError::NoFaceDetected
            | AnalysisError::InvalidDetection(_)
            | AnalysisError::Probe(ThumbnailError::InvalidDetection(_)),
        ) => {
            tracing::debug!(error = %msg, "rejecting request");
            zbus::fdo::Error::InvalidArgs(msg)
        }
        _ => {
            tracing::warn!(error = %msg, "request failed");
            zbus::fdo::Error::Failed(msg)
        }
    }
}
