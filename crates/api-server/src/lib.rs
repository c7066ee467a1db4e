//! REST API server for video emotion analysis
//!
//! Thin HTTP shell over the job orchestrator:
//! - `POST /uploadVideo`: store a video, returns its server-side name
//! - `POST /analyzeVideo`: queue analysis of an uploaded video
//! - `GET /jobs/{job_id}`: poll a job
//! - `GET /health`

mod handlers;
pub mod settings;
mod types;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use video_emotion_orchestrator::JobOrchestrator;

pub use handlers::*;
pub use settings::ServerSettings;
pub use types::*;

/// API server state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<JobOrchestrator>,
    pub settings: Arc<ServerSettings>,
}

impl ApiState {
    #[must_use]
    pub fn new(orchestrator: JobOrchestrator, settings: ServerSettings) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            settings: Arc::new(settings),
        }
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    let body_limit = state.settings.max_upload_bytes;
    Router::new()
        .route("/health", get(health_check))
        .route("/uploadVideo", post(upload_video))
        .route("/analyzeVideo", post(analyze_video))
        .route("/jobs/{job_id}", get(get_job_status))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on an already bound listener
pub async fn serve(listener: TcpListener, state: ApiState) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(&state.settings.upload_dir).await?;
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(
            "Listening on {} (uploads in {})",
            addr,
            state.settings.upload_dir.display()
        );
    }

    axum::serve(listener, build_router(state)).await
}

/// Start the API server
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    tracing::info!("Starting API server on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state).await
}
