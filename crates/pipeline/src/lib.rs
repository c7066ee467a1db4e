//! Per-frame emotion analysis
//!
//! For each frame: locate faces, keep the largest, crop it, classify the crop.
//! Every failure below the frame boundary, panics included, becomes an
//! `"error"` [`FrameResult`]; one bad frame never stops the rest of a video.

pub mod artifacts;
pub mod result;
pub mod summary;

use image::RgbImage;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use video_emotion_classifier::{
    Classification, ClassifierError, EmotionClassifier, LabelSet, RESERVED_LABELS,
};
use video_emotion_common::{panic_message, BoundingBox, Frame};
use video_emotion_face_detection::{FaceDetectionError, FaceLocator};

pub use artifacts::{Artifact, ClassifierPreset, ConfigurationError, ModelArtifacts};
pub use result::{
    FrameOutcome, FrameResult, VideoAnalysisResult, ERROR_EMOTION, NO_FACE_DETECTED,
};
pub use summary::{EmotionCount, EmotionSummary};

/// Failure while analyzing one frame
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Face detection failed: {0}")]
    Detection(#[from] FaceDetectionError),

    #[error(transparent)]
    Classification(#[from] ClassifierError),
}

/// Face locator and emotion classifier composed per frame.
///
/// Cheap to clone; clones share the same loaded models.
#[derive(Clone)]
pub struct FrameAnalysisPipeline {
    locator: Arc<dyn FaceLocator>,
    classifier: Arc<dyn EmotionClassifier>,
}

impl FrameAnalysisPipeline {
    #[must_use]
    pub fn new(locator: Arc<dyn FaceLocator>, classifier: Arc<dyn EmotionClassifier>) -> Self {
        Self {
            locator,
            classifier,
        }
    }

    /// Labels the classifier scores
    #[must_use]
    pub fn labels(&self) -> &LabelSet {
        self.classifier.labels()
    }

    /// Analyze one sampled frame
    #[must_use]
    pub fn analyze(&self, frame: &Frame) -> FrameResult {
        self.analyze_image(&frame.image, frame.index)
    }

    /// Analyze a still image, reported under `frame_index`
    #[must_use]
    pub fn analyze_image(&self, image: &RgbImage, frame_index: usize) -> FrameResult {
        let outcome = match catch_unwind(AssertUnwindSafe(|| self.try_analyze(image))) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!("Frame {} analysis failed: {}", frame_index, e);
                FrameOutcome::Error {
                    message: e.to_string(),
                }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!("Frame {} analysis panicked: {}", frame_index, message);
                FrameOutcome::Error { message }
            }
        };

        FrameResult {
            frame_index,
            outcome,
        }
    }

    /// Analyze frames in input order, one result per frame
    pub fn analyze_many<I>(&self, frames: I) -> VideoAnalysisResult
    where
        I: IntoIterator<Item = Frame>,
    {
        frames.into_iter().map(|frame| self.analyze(&frame)).collect()
    }

    fn try_analyze(&self, image: &RgbImage) -> Result<FrameOutcome, AnalysisError> {
        let faces = self.locator.locate(image)?;
        let Some(face) = largest_face(&faces) else {
            return Ok(FrameOutcome::NoFaceDetected);
        };

        let Some(crop) = face.crop(image) else {
            debug!("Degenerate face crop {:?}, treating as no face", face);
            return Ok(FrameOutcome::NoFaceDetected);
        };

        let classification = self.classifier.classify(&crop)?;
        check_classification(&classification)?;
        Ok(FrameOutcome::Emotion {
            emotion: classification.emotion,
            confidence: classification.confidence,
            scores: classification.scores,
        })
    }
}

/// Reject classifier output that would break the `FrameResult` contract:
/// confidence and every score finite and within [0, 1], and the winning label
/// present in `scores` with a score equal to the confidence.
fn check_classification(classification: &Classification) -> Result<(), ClassifierError> {
    let in_range = |p: f32| p.is_finite() && (0.0..=1.0).contains(&p);
    let invalid = |reason: String| Err(ClassifierError::Inference(reason));

    if !in_range(classification.confidence) {
        return invalid(format!(
            "confidence {} outside [0, 1]",
            classification.confidence
        ));
    }
    if RESERVED_LABELS.contains(&classification.emotion.as_str()) {
        return invalid(format!("reserved label '{}'", classification.emotion));
    }
    if let Some((label, score)) = classification.scores.iter().find(|&(_, &p)| !in_range(p)) {
        return invalid(format!("score {score} for '{label}' outside [0, 1]"));
    }
    match classification.scores.get(&classification.emotion) {
        Some(&score) if score == classification.confidence => Ok(()),
        Some(&score) => invalid(format!(
            "confidence {} differs from score {} of '{}'",
            classification.confidence, score, classification.emotion
        )),
        None => invalid(format!(
            "label '{}' missing from scores",
            classification.emotion
        )),
    }
}

/// Box with the largest area; the first one wins among equals
#[must_use]
pub fn largest_face(faces: &[BoundingBox]) -> Option<BoundingBox> {
    faces.iter().copied().fold(None, |best, face| match best {
        Some(b) if b.area() >= face.area() => Some(b),
        _ => Some(face),
    })
}
