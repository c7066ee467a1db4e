//! Deterministic stand-ins for the face detector and emotion classifier
#![allow(dead_code)]

use image::{Rgb, RgbImage};
use std::path::PathBuf;
use std::sync::Arc;
use video_emotion_classifier::{
    classification_from_scores, Classification, ClassifierError, EmotionClassifier, LabelSet,
    OutputActivation,
};
use video_emotion_common::BoundingBox;
use video_emotion_face_detection::{FaceDetectionError, FaceLocator};
use video_emotion_pipeline::FrameAnalysisPipeline;

/// Finds faces wherever the green channel is bright: one box per bright
/// 16-pixel column band, returned left to right
pub struct BandLocator;

impl FaceLocator for BandLocator {
    fn locate(&self, frame: &RgbImage) -> Result<Vec<BoundingBox>, FaceDetectionError> {
        let (width, height) = frame.dimensions();
        let boxes = (0..width / 16)
            .filter(|band| frame.get_pixel(band * 16, height / 2)[1] > 128)
            .map(|band| BoundingBox::new(band * 16, 0, 16, height))
            .collect();
        Ok(boxes)
    }
}

/// Scores the crop's mean red level against the default label set:
/// bright red crops are angry, dark ones neutral
pub struct RednessClassifier {
    labels: LabelSet,
}

impl Default for RednessClassifier {
    fn default() -> Self {
        Self {
            labels: LabelSet::default(),
        }
    }
}

impl EmotionClassifier for RednessClassifier {
    fn classify(&self, face: &RgbImage) -> Result<Classification, ClassifierError> {
        let pixels = face.pixels().len().max(1) as f32;
        let red = face.pixels().map(|p| f32::from(p[0])).sum::<f32>() / pixels / 255.0;

        // angry, disgust, fear, happy, sad, surprise, neutral, contempt
        let logits = [red * 4.0, 0.0, 0.0, 0.5, 0.0, 0.0, (1.0 - red) * 4.0, 0.0];
        classification_from_scores(&logits, &self.labels, OutputActivation::Logits)
    }

    fn labels(&self) -> &LabelSet {
        &self.labels
    }
}

pub fn pipeline() -> FrameAnalysisPipeline {
    FrameAnalysisPipeline::new(Arc::new(BandLocator), Arc::new(RednessClassifier::default()))
}

/// `count` frames of 64x48. Every third frame has no face; the face band of
/// the others turns from red to dark every ten frames.
pub fn synthetic_video(count: usize) -> Vec<RgbImage> {
    (0..count)
        .map(|i| {
            let mut frame = RgbImage::new(64, 48);
            if i % 3 != 2 {
                let red = if (i / 10) % 2 == 0 { 250 } else { 40 };
                for y in 0..48 {
                    for x in 16..32 {
                        frame.put_pixel(x, y, Rgb([red, 200, 0]));
                    }
                }
            }
            frame
        })
        .collect()
}

pub fn video_path(name: &str) -> PathBuf {
    PathBuf::from("/videos").join(name)
}
