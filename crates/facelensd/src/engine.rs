use crate::frame_source::{CapturedFrame, SourceError};
use facelens_core::{
    Analysis, AnalysisError, EnrollmentRecord, EnrollmentStore, FaceGeometry, InvalidDetection,
    PixelDiffMatcher, SelectionPolicy, StoreError, Thumbnail, ThumbnailError,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),
    #[error("enrollment rejected: {0}")]
    Store(#[from] StoreError),
    #[error("enrollment rejected: {0}")]
    InvalidDetection(#[from] InvalidDetection),
    #[error("thumbnail error: {0}")]
    Thumbnail(#[from] ThumbnailError),
    #[error("frame source error: {0}")]
    Source(#[from] SourceError),
    #[error("frame loading task failed: {0}")]
    LoadTask(#[source] tokio::task::JoinError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Engine parameters fixed at startup.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub acceptance_threshold: f32,
    pub detection_policy: SelectionPolicy,
    pub seed: Option<u64>,
}

/// Messages sent from D-Bus handlers and recognition mode to the engine thread.
enum EngineRequest {
    Enroll {
        label: String,
        capture: CapturedFrame,
        reply: oneshot::Sender<Result<EnrollmentRecord, EngineError>>,
    },
    Analyze {
        capture: CapturedFrame,
        reply: oneshot::Sender<Result<Analysis, EngineError>>,
    },
    List {
        reply: oneshot::Sender<Vec<EnrollmentRecord>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Enroll `label` from a frame: the selected detection's crop, or the
    /// whole frame when there are no detections.
    pub async fn enroll(&self, label: String, capture: CapturedFrame) -> Result<EnrollmentRecord, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll {
                label,
                capture,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Run one analysis cycle against the current store.
    pub async fn analyze(&self, capture: CapturedFrame) -> Result<Analysis, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze {
                capture,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Enrolled records in insertion order.
    pub async fn list(&self) -> Result<Vec<EnrollmentRecord>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::List { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// State owned by the engine thread. The store has exactly one writer.
struct Engine {
    store: EnrollmentStore,
    matcher: PixelDiffMatcher,
    policy: SelectionPolicy,
    rng: StdRng,
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the enrollment store for the lifetime of the daemon and
/// serves requests one at a time until every handle is dropped.
pub fn spawn_engine(settings: EngineSettings) -> Result<EngineHandle, EngineError> {
    let rng = match settings.seed {
        Some(seed) => {
            tracing::info!(seed, "age jitter seeded");
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    };

    let mut engine = Engine {
        store: EnrollmentStore::new(),
        matcher: PixelDiffMatcher {
            threshold: settings.acceptance_threshold,
        },
        policy: settings.detection_policy,
        rng,
    };

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facelens-engine".into())
        .spawn(move || {
            tracing::info!(
                threshold = engine.matcher.threshold,
                policy = %engine.policy,
                "engine thread started"
            );
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll {
                        label,
                        capture,
                        reply,
                    } => {
                        let _ = reply.send(engine.enroll(&label, &capture));
                    }
                    EngineRequest::Analyze { capture, reply } => {
                        let _ = reply.send(engine.analyze(&capture));
                    }
                    EngineRequest::List { reply } => {
                        let _ = reply.send(engine.store.snapshot());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

impl Engine {
    fn enroll(&mut self, label: &str, capture: &CapturedFrame) -> Result<EnrollmentRecord, EngineError> {
        let thumbnail = match self.policy.select(&capture.detections) {
            Some(idx) => {
                let detection = &capture.detections[idx];
                FaceGeometry::from_detection(detection)?;
                Thumbnail::crop_from_frame(&capture.frame, detection)?
            }
            None => {
                tracing::debug!(label, "no detections supplied; enrolling whole frame");
                Thumbnail::from_image(&capture.frame)?
            }
        };

        let record = self.store.enroll(label, thumbnail)?.clone();
        tracing::info!(
            label = %record.label,
            enrolled = self.store.len(),
            "face enrolled"
        );
        Ok(record)
    }

    fn analyze(&mut self, capture: &CapturedFrame) -> Result<Analysis, EngineError> {
        Ok(facelens_core::analyze(
            &capture.frame,
            &capture.detections,
            &self.store,
            &self.matcher,
            self.policy,
            &mut self.rng,
        )?)
    }
}
