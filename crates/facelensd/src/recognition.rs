//! Continuous recognition mode.
//!
//! While running, a task captures a frame every interval and runs it through
//! the engine. Each start opens a new generation; stopping bumps the
//! generation and aborts the task, so a cycle that was already in flight can
//! finish on the engine thread but its result is never published.

use crate::engine::{EngineError, EngineHandle};
use crate::frame_source::FrameSource;
use facelens_core::Analysis;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Outcome of one recognition tick.
#[derive(Debug, Clone, Serialize)]
pub struct RecognitionEvent {
    pub generation: u64,
    /// 1-based tick number within the generation.
    pub tick: u64,
    pub analysis: Option<Analysis>,
    /// Why the tick produced no analysis (no face, unreadable frame, ...).
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct Shared {
    generation: u64,
    latest: Option<RecognitionEvent>,
}

impl Shared {
    /// Store `event` unless its generation has been superseded.
    fn publish(&mut self, event: RecognitionEvent) -> bool {
        if event.generation != self.generation {
            tracing::debug!(
                stale = event.generation,
                current = self.generation,
                "discarding stale recognition result"
            );
            return false;
        }
        self.latest = Some(event);
        true
    }
}

pub struct RecognitionMode {
    runtime: Handle,
    engine: EngineHandle,
    source: Arc<dyn FrameSource>,
    interval: Duration,
    shared: Arc<Mutex<Shared>>,
    task: Option<JoinHandle<()>>,
}

impl RecognitionMode {
    /// `runtime` is where the ticking task is spawned; D-Bus handlers may
    /// call `start` from outside of it.
    pub fn new(runtime: Handle, engine: EngineHandle, source: Arc<dyn FrameSource>, interval: Duration) -> Self {
        Self {
            runtime,
            engine,
            source,
            interval,
            shared: Arc::new(Mutex::new(Shared::default())),
            task: None,
        }
    }

    /// Start ticking. Returns false if already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }

        let generation = {
            let mut shared = lock(&self.shared);
            shared.generation += 1;
            shared.generation
        };

        tracing::info!(generation, interval_ms = self.interval.as_millis() as u64, "recognition mode started");
        self.task = Some(self.runtime.spawn(run(
            generation,
            self.engine.clone(),
            Arc::clone(&self.source),
            self.interval,
            Arc::clone(&self.shared),
        )));
        true
    }

    /// Stop ticking. Returns false if it was not running.
    pub fn stop(&mut self) -> bool {
        let Some(task) = self.task.take() else {
            return false;
        };
        let generation = {
            let mut shared = lock(&self.shared);
            shared.generation += 1;
            shared.generation
        };
        task.abort();
        tracing::info!(generation, "recognition mode stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Most recent result from a generation that was current when it finished.
    pub fn latest(&self) -> Option<RecognitionEvent> {
        lock(&self.shared).latest.clone()
    }

    pub fn generation(&self) -> u64 {
        lock(&self.shared).generation
    }
}

impl Drop for RecognitionMode {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn run(
    generation: u64,
    engine: EngineHandle,
    source: Arc<dyn FrameSource>,
    interval: Duration,
    shared: Arc<Mutex<Shared>>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tick = 0u64;

    loop {
        ticker.tick().await;
        tick += 1;

        let outcome = recognize_once(&engine, &source).await;
        let event = match outcome {
            Ok(analysis) => RecognitionEvent {
                generation,
                tick,
                analysis: Some(analysis),
                error: None,
            },
            Err(EngineError::ChannelClosed) => {
                tracing::warn!(generation, "engine gone; recognition mode exiting");
                return;
            }
            Err(err) => {
                tracing::debug!(generation, tick, error = %err, "recognition tick produced no analysis");
                RecognitionEvent {
                    generation,
                    tick,
                    analysis: None,
                    error: Some(err.to_string()),
                }
            }
        };

        if !lock(&shared).publish(event) {
            return;
        }
    }
}

async fn recognize_once(engine: &EngineHandle, source: &Arc<dyn FrameSource>) -> Result<Analysis, EngineError> {
    let source = Arc::clone(source);
    let capture = tokio::task::spawn_blocking(move || source.capture())
        .await
        .map_err(EngineError::LoadTask)??;
    engine.analyze(capture).await
}
