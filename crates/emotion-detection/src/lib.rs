//! Facial emotion classification via ONNX Runtime
//!
//! Classifies one cropped face into a fixed, ordered [`LabelSet`]:
//! - MobileNetV2 FER models (default): 224x224 RGB, NHWC, [-1, 1], softmax output
//! - Emotion FerPlus-8 (`ClassifierConfig::fer_plus`): 64x64 grayscale, NCHW,
//!   [0, 1], raw logits
//!
//! Loading runs one probe inference and rejects models whose output width
//! differs from the label count.

pub mod labels;
pub mod preprocess;

use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};
use video_emotion_common::lock_session;
use video_emotion_common::onnx::{create_session, OnnxError};

pub use labels::{LabelSet, LabelSetError, RESERVED_LABELS};
pub use preprocess::{preprocess, ChannelOrder, Normalization, TensorLayout};

/// Predicted emotion for one face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Label with the highest score
    pub emotion: String,
    /// Score of `emotion`, in [0, 1]
    pub confidence: f32,
    /// Score of every configured label
    pub scores: BTreeMap<String, f32>,
}

/// Classifies cropped face images.
///
/// Implementations are shared read-only by all analysis workers.
pub trait EmotionClassifier: Send + Sync {
    /// Classify one face crop.
    ///
    /// # Errors
    ///
    /// Returns an error when preprocessing or inference fails for this crop.
    fn classify(&self, face: &RgbImage) -> Result<Classification, ClassifierError>;

    /// The ordered labels this classifier scores
    fn labels(&self) -> &LabelSet;
}

/// Classifier errors
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Failed to load emotion model: {0}")]
    ModelLoad(#[from] OnnxError),

    #[error("Model produces {outputs} scores but {labels} labels are configured")]
    LabelMismatch { labels: usize, outputs: usize },

    #[error("Preprocessing failed: {0}")]
    Preprocessing(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// What the model's output layer emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputActivation {
    /// Already a probability distribution
    Probabilities,
    /// Raw logits; softmax is applied
    Logits,
}

/// Classifier configuration, fixed at load time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Square input side in pixels
    pub input_size: u32,
    pub color: ChannelOrder,
    pub normalization: Normalization,
    pub layout: TensorLayout,
    pub activation: OutputActivation,
    pub labels: LabelSet,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            input_size: 224,
            color: ChannelOrder::Rgb,
            normalization: Normalization::MobileNetV2,
            layout: TensorLayout::Nhwc,
            activation: OutputActivation::Probabilities,
            labels: LabelSet::default(),
        }
    }
}

impl ClassifierConfig {
    /// Emotion FerPlus-8 from the ONNX Model Zoo
    #[must_use]
    pub fn fer_plus() -> Self {
        Self {
            input_size: 64,
            color: ChannelOrder::Gray,
            normalization: Normalization::UnitRange,
            layout: TensorLayout::Nchw,
            activation: OutputActivation::Logits,
            labels: LabelSet::fer_plus(),
        }
    }

    /// Preprocess a face crop according to this configuration
    #[must_use]
    pub fn preprocess(&self, face: &RgbImage) -> Array4<f32> {
        preprocess(
            face,
            self.input_size,
            self.color,
            self.normalization,
            self.layout,
        )
    }
}

/// Emotion classifier backed by an ONNX model
pub struct OnnxEmotionClassifier {
    session: Mutex<Session>,
    input_name: String,
    config: ClassifierConfig,
}

impl OnnxEmotionClassifier {
    /// Load the model and verify its output width against the label set
    ///
    /// # Errors
    ///
    /// Fails if the model cannot be loaded, the probe inference fails, or the
    /// model output width differs from `config.labels.len()`.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        config: ClassifierConfig,
    ) -> Result<Self, ClassifierError> {
        let model_path = model_path.as_ref();
        if config.input_size == 0 {
            return Err(ClassifierError::Preprocessing(
                "input size must be positive".to_string(),
            ));
        }

        info!("Loading emotion model from {}", model_path.display());
        let session = create_session(model_path)?;
        let input_name = session
            .inputs
            .first()
            .ok_or_else(|| ClassifierError::Inference("model has no inputs".to_string()))?
            .name
            .clone();

        let classifier = Self {
            session: Mutex::new(session),
            input_name,
            config,
        };

        let blank = RgbImage::new(classifier.config.input_size, classifier.config.input_size);
        let outputs = classifier.run(&classifier.config.preprocess(&blank))?.len();
        if outputs != classifier.config.labels.len() {
            return Err(ClassifierError::LabelMismatch {
                labels: classifier.config.labels.len(),
                outputs,
            });
        }

        info!(
            "Emotion model loaded ({} labels: {})",
            outputs, classifier.config.labels
        );
        Ok(classifier)
    }

    #[must_use]
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// One forward pass; returns the raw output row
    fn run(&self, input: &Array4<f32>) -> Result<Vec<f32>, ClassifierError> {
        let tensor = TensorRef::from_array_view(input.view())
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let mut session = lock_session(&self.session, "classifier");
        let outputs = session
            .run(ort::inputs![&*self.input_name => tensor])
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;
        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        Ok(data.to_vec())
    }
}

impl EmotionClassifier for OnnxEmotionClassifier {
    fn classify(&self, face: &RgbImage) -> Result<Classification, ClassifierError> {
        let (width, height) = face.dimensions();
        if width == 0 || height == 0 {
            return Err(ClassifierError::Preprocessing(format!(
                "empty face crop ({width}x{height})"
            )));
        }

        let input = self.config.preprocess(face);
        let raw = self.run(&input)?;
        let result =
            classification_from_scores(&raw, &self.config.labels, self.config.activation)?;

        debug!(
            "Classified {}x{} face as {} ({:.3})",
            width, height, result.emotion, result.confidence
        );
        Ok(result)
    }

    fn labels(&self) -> &LabelSet {
        &self.config.labels
    }
}

/// Map one output row onto `labels`.
///
/// The winning label is the first maximal score in label order. Scores are
/// clamped to [0, 1] after the optional softmax.
///
/// # Errors
///
/// Fails when the row length differs from the label count or any score is
/// not finite.
pub fn classification_from_scores(
    raw: &[f32],
    labels: &LabelSet,
    activation: OutputActivation,
) -> Result<Classification, ClassifierError> {
    if raw.len() != labels.len() {
        return Err(ClassifierError::LabelMismatch {
            labels: labels.len(),
            outputs: raw.len(),
        });
    }
    if raw.iter().any(|v| !v.is_finite()) {
        return Err(ClassifierError::Inference(
            "model produced non-finite scores".to_string(),
        ));
    }

    let probabilities = match activation {
        OutputActivation::Probabilities => raw.to_vec(),
        OutputActivation::Logits => softmax(raw),
    };
    let probabilities: Vec<f32> = probabilities.iter().map(|p| p.clamp(0.0, 1.0)).collect();

    let mut best = 0;
    for (i, &p) in probabilities.iter().enumerate().skip(1) {
        if p > probabilities[best] {
            best = i;
        }
    }

    let emotion = labels
        .get(best)
        .ok_or_else(|| ClassifierError::Inference("empty label set".to_string()))?
        .to_string();
    let scores = labels
        .iter()
        .zip(&probabilities)
        .map(|(label, &p)| (label.to_string(), p))
        .collect();

    Ok(Classification {
        emotion,
        confidence: probabilities[best],
        scores,
    })
}

/// Apply softmax function to convert logits to probabilities
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let mut exps = Vec::with_capacity(logits.len());
    exps.extend(logits.iter().map(|&x| (x - max_logit).exp()));
    let sum_exps: f32 = exps.iter().sum();
    let mut probs = Vec::with_capacity(exps.len());
    probs.extend(exps.iter().map(|&x| x / sum_exps));
    probs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels3() -> LabelSet {
        LabelSet::new(["happy", "sad", "neutral"]).unwrap()
    }

    #[test]
    fn test_softmax() {
        let logits = vec![1.0, 2.0, 3.0];
        let probs = softmax(&logits);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1]);
        assert!(probs[1] > probs[0]);
    }

    #[test]
    fn test_confidence_matches_winning_score() {
        let result =
            classification_from_scores(&[0.1, 0.7, 0.2], &labels3(), OutputActivation::Probabilities)
                .unwrap();

        assert_eq!(result.emotion, "sad");
        assert_eq!(result.confidence, 0.7);
        assert_eq!(result.scores[&result.emotion], result.confidence);
        assert_eq!(result.scores.len(), 3);
    }

    #[test]
    fn test_tie_goes_to_first_label() {
        let result =
            classification_from_scores(&[0.4, 0.4, 0.2], &labels3(), OutputActivation::Probabilities)
                .unwrap();
        assert_eq!(result.emotion, "happy");
    }

    #[test]
    fn test_logits_are_softmaxed() {
        let result =
            classification_from_scores(&[0.0, 5.0, 1.0], &labels3(), OutputActivation::Logits)
                .unwrap();

        assert_eq!(result.emotion, "sad");
        let total: f32 = result.scores.values().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(result.scores.values().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_scores_are_clamped() {
        let result =
            classification_from_scores(&[1.2, -0.1, 0.0], &labels3(), OutputActivation::Probabilities)
                .unwrap();
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.scores["sad"], 0.0);
    }

    #[test]
    fn test_rejects_wrong_width() {
        let err = classification_from_scores(&[0.5, 0.5], &labels3(), OutputActivation::Probabilities)
            .unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::LabelMismatch {
                labels: 3,
                outputs: 2
            }
        ));
    }

    #[test]
    fn test_rejects_non_finite() {
        let err = classification_from_scores(
            &[f32::NAN, 0.5, 0.5],
            &labels3(),
            OutputActivation::Probabilities,
        )
        .unwrap_err();
        assert!(matches!(err, ClassifierError::Inference(_)));
    }

    #[test]
    fn test_fer_plus_preset() {
        let config = ClassifierConfig::fer_plus();
        assert_eq!(config.input_size, 64);
        assert_eq!(config.labels.get(0), Some("neutral"));
        let input = config.preprocess(&RgbImage::new(48, 48));
        assert_eq!(input.shape(), &[1, 1, 64, 64]);
    }

    #[test]
    fn test_missing_model_fails_to_load() {
        let result = OnnxEmotionClassifier::new("missing.onnx", ClassifierConfig::default());
        assert!(matches!(
            result,
            Err(ClassifierError::ModelLoad(OnnxError::ModelNotFound(_)))
        ));
    }

    #[test]
    #[ignore] // Run manually with: cargo test --package video-emotion-classifier -- --ignored
    fn test_classify_with_real_model() {
        let model_path = std::env::var("EMOTION_CLASSIFIER_MODEL")
            .unwrap_or_else(|_| "models/emotion-detection/emotion.onnx".to_string());
        if !Path::new(&model_path).exists() {
            println!("Model not found at {model_path}, skipping");
            return;
        }

        let classifier =
            OnnxEmotionClassifier::new(&model_path, ClassifierConfig::default()).expect("load");
        let face = RgbImage::from_pixel(120, 120, image::Rgb([180, 140, 120]));
        let result = classifier.classify(&face).expect("classify");

        assert_eq!(result.scores.len(), classifier.labels().len());
        assert_eq!(result.scores[&result.emotion], result.confidence);
    }
}
