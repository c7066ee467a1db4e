//! Per-frame analysis results
//!
//! On the wire every frame is one flat object:
//!
//! ```json
//! {"frame_index": 0, "emotion": "happy", "confidence": 0.91, "scores": {...}}
//! {"frame_index": 1, "emotion": "no_face_detected", "confidence": 0.0}
//! {"frame_index": 2, "emotion": "error", "confidence": 0.0, "error": "..."}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use video_emotion_classifier::RESERVED_LABELS;

/// Sentinel emotion for frames without a usable face
pub const NO_FACE_DETECTED: &str = RESERVED_LABELS[0];

/// Sentinel emotion for frames whose analysis failed
pub const ERROR_EMOTION: &str = RESERVED_LABELS[1];

/// Outcome of analyzing one frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// The largest face was classified
    Emotion {
        emotion: String,
        confidence: f32,
        scores: BTreeMap<String, f32>,
    },
    /// No face found, or the face crop was empty
    NoFaceDetected,
    /// Detection or classification failed for this frame
    Error { message: String },
}

/// Analysis result for one sampled frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "FrameRecord", try_from = "FrameRecord")]
pub struct FrameResult {
    pub frame_index: usize,
    pub outcome: FrameOutcome,
}

impl FrameResult {
    #[must_use]
    pub fn no_face(frame_index: usize) -> Self {
        Self {
            frame_index,
            outcome: FrameOutcome::NoFaceDetected,
        }
    }

    #[must_use]
    pub fn error(frame_index: usize, message: impl Into<String>) -> Self {
        Self {
            frame_index,
            outcome: FrameOutcome::Error {
                message: message.into(),
            },
        }
    }

    /// Emotion label, or one of the sentinels
    #[must_use]
    pub fn emotion(&self) -> &str {
        match &self.outcome {
            FrameOutcome::Emotion { emotion, .. } => emotion,
            FrameOutcome::NoFaceDetected => NO_FACE_DETECTED,
            FrameOutcome::Error { .. } => ERROR_EMOTION,
        }
    }

    /// Confidence in [0, 1]; 0.0 for sentinel outcomes
    #[must_use]
    pub fn confidence(&self) -> f32 {
        match &self.outcome {
            FrameOutcome::Emotion { confidence, .. } => *confidence,
            _ => 0.0,
        }
    }

    #[must_use]
    pub fn scores(&self) -> Option<&BTreeMap<String, f32>> {
        match &self.outcome {
            FrameOutcome::Emotion { scores, .. } => Some(scores),
            _ => None,
        }
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            FrameOutcome::Error { message } => Some(message),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct FrameRecord {
    frame_index: usize,
    emotion: String,
    confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scores: Option<BTreeMap<String, f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<FrameResult> for FrameRecord {
    fn from(result: FrameResult) -> Self {
        let (emotion, confidence, scores, error) = match result.outcome {
            FrameOutcome::Emotion {
                emotion,
                confidence,
                scores,
            } => (emotion, confidence, Some(scores), None),
            FrameOutcome::NoFaceDetected => (NO_FACE_DETECTED.to_string(), 0.0, None, None),
            FrameOutcome::Error { message } => {
                (ERROR_EMOTION.to_string(), 0.0, None, Some(message))
            }
        };

        Self {
            frame_index: result.frame_index,
            emotion,
            confidence,
            scores,
            error,
        }
    }
}

impl TryFrom<FrameRecord> for FrameResult {
    type Error = String;

    fn try_from(record: FrameRecord) -> Result<Self, Self::Error> {
        let outcome = match record.emotion.as_str() {
            NO_FACE_DETECTED => FrameOutcome::NoFaceDetected,
            ERROR_EMOTION => FrameOutcome::Error {
                message: record.error.unwrap_or_default(),
            },
            _ => {
                let scores = record
                    .scores
                    .ok_or_else(|| format!("frame {} has no scores", record.frame_index))?;
                if !(0.0..=1.0).contains(&record.confidence) {
                    return Err(format!(
                        "frame {} confidence {} outside [0, 1]",
                        record.frame_index, record.confidence
                    ));
                }
                FrameOutcome::Emotion {
                    emotion: record.emotion,
                    confidence: record.confidence,
                    scores,
                }
            }
        };

        Ok(Self {
            frame_index: record.frame_index,
            outcome,
        })
    }
}

/// Ordered per-frame results of one video, ascending `frame_index`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoAnalysisResult {
    pub frames: Vec<FrameResult>,
}

impl VideoAnalysisResult {
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrameResult> {
        self.frames.iter()
    }
}

impl FromIterator<FrameResult> for VideoAnalysisResult {
    fn from_iter<I: IntoIterator<Item = FrameResult>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a VideoAnalysisResult {
    type Item = &'a FrameResult;
    type IntoIter = std::slice::Iter<'a, FrameResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}
