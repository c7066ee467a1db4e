//! Model artifact resolution and loading
//!
//! Both models are resolved once at startup. A missing or unloadable artifact
//! is a [`ConfigurationError`] naming which one failed.

use crate::FrameAnalysisPipeline;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use video_emotion_classifier::{ClassifierConfig, LabelSet, OnnxEmotionClassifier};
use video_emotion_face_detection::{FaceDetectionConfig, UltraFaceDetector};

pub const FACE_MODEL_ENV: &str = "EMOTION_FACE_MODEL";
pub const CLASSIFIER_MODEL_ENV: &str = "EMOTION_CLASSIFIER_MODEL";
pub const LABELS_ENV: &str = "EMOTION_LABELS";
pub const PRESET_ENV: &str = "EMOTION_CLASSIFIER_PRESET";

pub const DEFAULT_FACE_MODEL: &str = "models/face-detection/version-RFB-320.onnx";
pub const DEFAULT_CLASSIFIER_MODEL: &str = "models/emotion-detection/emotion.onnx";

/// Which model artifact an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    FaceDetector,
    EmotionClassifier,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::FaceDetector => f.write_str("face detector"),
            Artifact::EmotionClassifier => f.write_str("emotion classifier"),
        }
    }
}

/// Fatal startup errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("{artifact} model not found at {}", path.display())]
    MissingArtifact { artifact: Artifact, path: PathBuf },

    #[error("Failed to load {artifact} model: {reason}")]
    ArtifactLoad { artifact: Artifact, reason: String },

    #[error("Invalid {name}: {reason}")]
    InvalidSetting { name: String, reason: String },
}

/// Classifier configuration presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierPreset {
    /// MobileNetV2, 224x224 RGB
    MobileNet,
    /// Emotion FerPlus-8, 64x64 grayscale
    FerPlus,
}

impl ClassifierPreset {
    #[must_use]
    pub fn config(self) -> ClassifierConfig {
        match self {
            ClassifierPreset::MobileNet => ClassifierConfig::default(),
            ClassifierPreset::FerPlus => ClassifierConfig::fer_plus(),
        }
    }
}

impl std::str::FromStr for ClassifierPreset {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mobilenet" | "mobilenetv2" => Ok(ClassifierPreset::MobileNet),
            "ferplus" | "fer_plus" | "fer+" => Ok(ClassifierPreset::FerPlus),
            other => Err(ConfigurationError::InvalidSetting {
                name: PRESET_ENV.to_string(),
                reason: format!("unknown preset '{other}' (expected mobilenet or ferplus)"),
            }),
        }
    }
}

/// Locations and configuration of both models
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub face_model: PathBuf,
    pub classifier_model: PathBuf,
    pub face_config: FaceDetectionConfig,
    pub classifier_config: ClassifierConfig,
}

impl Default for ModelArtifacts {
    fn default() -> Self {
        Self {
            face_model: PathBuf::from(DEFAULT_FACE_MODEL),
            classifier_model: PathBuf::from(DEFAULT_CLASSIFIER_MODEL),
            face_config: FaceDetectionConfig::default(),
            classifier_config: ClassifierConfig::default(),
        }
    }
}

impl ModelArtifacts {
    /// Defaults overridden by `EMOTION_*` environment variables
    ///
    /// # Errors
    ///
    /// Fails on an unknown preset or an invalid label list.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigurationError> {
        let mut artifacts = Self::default();

        if let Some(path) = lookup(FACE_MODEL_ENV) {
            artifacts.face_model = PathBuf::from(path);
        }
        if let Some(path) = lookup(CLASSIFIER_MODEL_ENV) {
            artifacts.classifier_model = PathBuf::from(path);
        }
        if let Some(preset) = lookup(PRESET_ENV) {
            artifacts.classifier_config = preset.parse::<ClassifierPreset>()?.config();
        }
        if let Some(labels) = lookup(LABELS_ENV) {
            artifacts.classifier_config.labels = parse_labels(&labels)?;
        }

        Ok(artifacts)
    }

    /// Load both models and build the shared pipeline
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingArtifact`] for a missing file and
    /// [`ConfigurationError::ArtifactLoad`] when a model fails to initialize,
    /// including a label count that disagrees with the classifier output.
    pub fn load(&self) -> Result<FrameAnalysisPipeline, ConfigurationError> {
        for (artifact, path) in [
            (Artifact::FaceDetector, &self.face_model),
            (Artifact::EmotionClassifier, &self.classifier_model),
        ] {
            if !path.is_file() {
                return Err(ConfigurationError::MissingArtifact {
                    artifact,
                    path: path.clone(),
                });
            }
        }

        let detector = UltraFaceDetector::new(&self.face_model, self.face_config.clone())
            .map_err(|e| ConfigurationError::ArtifactLoad {
                artifact: Artifact::FaceDetector,
                reason: e.to_string(),
            })?;
        let classifier =
            OnnxEmotionClassifier::new(&self.classifier_model, self.classifier_config.clone())
                .map_err(|e| ConfigurationError::ArtifactLoad {
                    artifact: Artifact::EmotionClassifier,
                    reason: e.to_string(),
                })?;

        info!(
            "Models ready: face detector {}, emotion classifier {}",
            self.face_model.display(),
            self.classifier_model.display()
        );
        Ok(FrameAnalysisPipeline::new(
            Arc::new(detector),
            Arc::new(classifier),
        ))
    }
}

/// Parse a comma-separated label list
///
/// # Errors
///
/// Returns [`ConfigurationError::InvalidSetting`] for an empty, blank,
/// duplicated or reserved label.
pub fn parse_labels(text: &str) -> Result<LabelSet, ConfigurationError> {
    text.parse::<LabelSet>()
        .map_err(|e| ConfigurationError::InvalidSetting {
            name: LABELS_ENV.to_string(),
            reason: e.to_string(),
        })
}
