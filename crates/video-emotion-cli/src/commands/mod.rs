pub mod analyze;
pub mod image;

use anyhow::{Context as _, Result};
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use video_emotion_pipeline::{
    artifacts::parse_labels, ClassifierPreset, FrameAnalysisPipeline, FrameResult,
    ModelArtifacts,
};

/// Model selection shared by every command; unset flags fall back to the
/// `EMOTION_*` environment variables
#[derive(Args)]
pub struct ModelArgs {
    /// Face detector ONNX model (UltraFace)
    #[arg(long, value_name = "FILE")]
    face_model: Option<PathBuf>,

    /// Emotion classifier ONNX model
    #[arg(long, value_name = "FILE")]
    classifier_model: Option<PathBuf>,

    /// Classifier input convention
    #[arg(long, value_enum)]
    preset: Option<Preset>,

    /// Comma-separated labels in model output order
    #[arg(long)]
    labels: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Mobilenet,
    Ferplus,
}

impl ModelArgs {
    pub fn load_pipeline(&self) -> Result<FrameAnalysisPipeline> {
        let mut artifacts =
            ModelArtifacts::from_env().context("Invalid model settings in environment")?;

        if let Some(path) = &self.face_model {
            artifacts.face_model = path.clone();
        }
        if let Some(path) = &self.classifier_model {
            artifacts.classifier_model = path.clone();
        }
        if let Some(preset) = self.preset {
            let preset = match preset {
                Preset::Mobilenet => ClassifierPreset::MobileNet,
                Preset::Ferplus => ClassifierPreset::FerPlus,
            };
            let labels = artifacts.classifier_config.labels.clone();
            artifacts.classifier_config = preset.config();
            // Labels from the environment outlive a preset switch
            if std::env::var_os(video_emotion_pipeline::artifacts::LABELS_ENV).is_some() {
                artifacts.classifier_config.labels = labels;
            }
        }
        if let Some(labels) = &self.labels {
            artifacts.classifier_config.labels = parse_labels(labels)?;
        }

        artifacts.load().context("Failed to load models")
    }
}

/// One human-readable line per frame
pub fn format_frame(result: &FrameResult) -> String {
    match result.error_message() {
        Some(message) => format!("frame {:>5}  error: {}", result.frame_index, message),
        None => format!(
            "frame {:>5}  {:<16} {:.3}",
            result.frame_index,
            result.emotion(),
            result.confidence()
        ),
    }
}
