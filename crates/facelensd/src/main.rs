use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod frame_source;
mod recognition;

use dbus_interface::{AnalyzerService, BUS_NAME, OBJECT_PATH};
use engine::EngineSettings;
use frame_source::SnapshotDirSource;
use recognition::RecognitionMode;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facelensd starting");

    let config = config::Config::load().context("failed to load configuration")?;
    tracing::info!(
        snapshot_dir = %config.snapshot_dir.display(),
        threshold = config.acceptance_threshold,
        policy = %config.detection_policy,
        interval_ms = config.recognition_interval_ms,
        "configuration loaded"
    );

    let settings = EngineSettings {
        acceptance_threshold: config.acceptance_threshold,
        detection_policy: config.detection_policy,
        seed: config.seed,
    };
    let engine = engine::spawn_engine(settings)?;

    let source = Arc::new(SnapshotDirSource::new(
        &config.snapshot_dir,
        &config.frame_file,
        &config.detections_file,
    ));
    let runtime = tokio::runtime::Handle::current();
    let recognition = RecognitionMode::new(runtime.clone(), engine.clone(), source, config.recognition_interval());

    let service = AnalyzerService::new(runtime, engine, recognition, settings, config.snapshot_dir.clone());

    let _conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on the session bus")?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "facelensd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facelensd shutting down");

    Ok(())
}
