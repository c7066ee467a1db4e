//! HTTP request handlers for API endpoints

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use uuid::Uuid;
use video_emotion_orchestrator::OrchestratorError;

use crate::settings::sanitize_filename;
use crate::types::{
    AnalyzeRequest, AnalyzeResponse, ApiError, HealthResponse, UploadResponse,
};
use crate::ApiState;

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Store an uploaded video under a fresh name
///
/// Expects a multipart form with a `file` field.
pub async fn upload_video(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        if original.is_empty() {
            return Err(ApiError::bad_request("no selected file"));
        }
        let ext = state
            .settings
            .allowed_extension(&original)
            .ok_or_else(|| ApiError::bad_request("file type not allowed"))?;

        let upload_dir = &state.settings.upload_dir;
        tokio::fs::create_dir_all(upload_dir)
            .await
            .map_err(|e| ApiError::internal(format!("cannot create upload dir: {e}")))?;

        let filename = format!("{}.{ext}", Uuid::new_v4().simple());
        let path = upload_dir.join(&filename);
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| ApiError::internal(format!("cannot store upload: {e}")))?;

        let mut written = 0usize;
        loop {
            let chunk = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    tokio::fs::remove_file(&path).await.ok();
                    warn!("Upload of {} aborted: {}", original, e);
                    return Err(e.into());
                }
            };
            written += chunk.len();
            if let Err(e) = file.write_all(&chunk).await {
                tokio::fs::remove_file(&path).await.ok();
                return Err(ApiError::internal(format!("cannot store upload: {e}")));
            }
        }
        file.flush()
            .await
            .map_err(|e| ApiError::internal(format!("cannot store upload: {e}")))?;

        info!("Stored upload {} as {} ({} bytes)", original, filename, written);
        return Ok((StatusCode::CREATED, Json(UploadResponse { filename })));
    }

    Err(ApiError::bad_request("no file part"))
}

/// Queue analysis of a previously uploaded video
pub async fn analyze_video(
    State(state): State<ApiState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("Rejected analyze request: {}", rejection.body_text());
        ApiError::bad_request("json required")
    })?;

    let requested = request
        .video_filename
        .ok_or_else(|| ApiError::bad_request("video_filename required"))?;
    let filename =
        sanitize_filename(&requested).ok_or_else(|| ApiError::bad_request("invalid filename"))?;

    let path = state.settings.upload_dir.join(&filename);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(ApiError::not_found("file not found"));
    }

    let job_id = state
        .orchestrator
        .submit(path, request.frame_interval)
        .map_err(|e| match e {
            OrchestratorError::InvalidInterval(_) => ApiError::bad_request(e.to_string()),
            other => {
                error!("Failed to submit {}: {}", filename, other);
                ApiError::internal(other.to_string())
            }
        })?;

    let status_url = format!("/jobs/{job_id}");
    Ok((
        StatusCode::ACCEPTED,
        [(header::LOCATION, status_url.clone())],
        Json(AnalyzeResponse {
            job_id: job_id.to_string(),
            status_url,
        }),
    ))
}

/// Current status of a job
pub async fn get_job_status(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .orchestrator
        .get_status(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("job not found"))
}
