//! ONNX Runtime session construction shared by the face detector and the
//! emotion classifier.

use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::path::Path;
use tracing::debug;

/// Environment variable overriding the intra-op thread count
pub const THREADS_ENV: &str = "EMOTION_ONNX_THREADS";

/// Error type for ONNX session creation
#[derive(Debug, thiserror::Error)]
pub enum OnnxError {
    #[error("Failed to create session builder: {0}")]
    SessionBuilderError(String),

    #[error("Failed to load ONNX model from {path}: {error}")]
    ModelLoadError { path: String, error: String },

    #[error("Model file not found: {0}")]
    ModelNotFound(String),
}

/// Intra-op thread count: `EMOTION_ONNX_THREADS` if set, else physical cores
fn intra_threads() -> usize {
    std::env::var(THREADS_ENV)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(num_cpus::get_physical)
}

/// Create an ONNX Runtime session with full graph optimization.
///
/// CUDA is registered ahead of the CPU provider; ONNX Runtime assigns nodes to
/// the first provider that supports them, so CPU-only hosts fall through.
///
/// # Errors
///
/// Returns [`OnnxError::ModelNotFound`] when `model_path` does not exist and
/// [`OnnxError::ModelLoadError`] when the file is not a loadable model.
pub fn create_session(model_path: &Path) -> Result<Session, OnnxError> {
    if !model_path.is_file() {
        return Err(OnnxError::ModelNotFound(model_path.display().to_string()));
    }

    let num_threads = intra_threads();
    debug!(
        "Creating ONNX session for {} ({} intra-op threads)",
        model_path.display(),
        num_threads
    );

    Session::builder()
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_intra_threads(num_threads)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_memory_pattern(true)
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .with_execution_providers([
            CUDAExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ])
        .map_err(|e| OnnxError::SessionBuilderError(e.to_string()))?
        .commit_from_file(model_path)
        .map_err(|e| OnnxError::ModelLoadError {
            path: model_path.display().to_string(),
            error: e.to_string(),
        })
}
