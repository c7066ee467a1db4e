//! API Server Binary Entry Point

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use video_emotion_api_server::{start_server, ApiState, ServerSettings};
use video_emotion_decoder::FfmpegVideoSource;
use video_emotion_orchestrator::{JobOrchestrator, OrchestratorConfig};
use video_emotion_pipeline::ModelArtifacts;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "video_emotion_api_server=info,video_emotion_orchestrator=info,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = ServerSettings::from_env();

    // Models load before the socket opens; a missing artifact stops startup
    let pipeline = ModelArtifacts::from_env()
        .and_then(|artifacts| artifacts.load())
        .context("Failed to initialize analysis models")?;

    let config = OrchestratorConfig::from_env().context("Invalid orchestrator settings")?;
    let orchestrator = JobOrchestrator::new(pipeline, Arc::new(FfmpegVideoSource::new()), config)
        .context("Failed to start job orchestrator")?;

    tracing::info!("Starting Video Emotion Analysis API Server");
    let addr = settings.addr.clone();
    start_server(&addr, ApiState::new(orchestrator, settings))
        .await
        .with_context(|| format!("Server on {addr} failed"))?;

    Ok(())
}
