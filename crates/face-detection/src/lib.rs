//! Face localization using UltraFace via ONNX Runtime
//!
//! A [`FaceLocator`] returns zero or more axis-aligned face boxes for one frame.
//! Boxes carry no ordering guarantee that callers may rely on; choosing which
//! face to analyze is the caller's policy.
//!
//! The bundled [`UltraFaceDetector`] runs the UltraFace RFB models (1-2 MB):
//! - Fixed detector configuration, never per-request
//! - Confidence threshold and greedy non-maximum suppression
//! - Minimum face size filter in frame pixels
//! - Accepts models exporting decoded boxes + probabilities, or raw anchor
//!   offsets + logits
//!
//! # Example
//! ```no_run
//! use video_emotion_face_detection::{FaceDetectionConfig, FaceLocator, UltraFaceDetector};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let detector = UltraFaceDetector::new("version-RFB-320.onnx", FaceDetectionConfig::default())?;
//! let frame = image::open("frame.jpg")?.to_rgb8();
//!
//! for face in detector.locate(&frame)? {
//!     println!("face at ({}, {}) {}x{}", face.x, face.y, face.width, face.height);
//! }
//! # Ok(())
//! # }
//! ```

pub mod anchors;

use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};
use video_emotion_common::onnx::{create_session, OnnxError};
use video_emotion_common::{lock_session, BoundingBox};

/// Locates faces in a decoded frame.
///
/// Implementations are shared read-only across analysis workers. An empty
/// result is a normal outcome, not an error.
pub trait FaceLocator: Send + Sync {
    /// Return the face boxes found in `frame`, in frame pixel coordinates.
    ///
    /// # Errors
    ///
    /// Returns an error only when the underlying detector fails to run.
    fn locate(&self, frame: &RgbImage) -> Result<Vec<BoundingBox>, FaceDetectionError>;
}

/// How the detector model encodes its outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputEncoding {
    /// Corner-form boxes and softmax probabilities (reference ONNX export)
    Decoded,
    /// Anchor regression offsets and two-class logits
    Raw,
}

/// Configuration for face detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceDetectionConfig {
    /// Minimum face probability (0.0-1.0)
    pub confidence_threshold: f32,
    /// `IoU` above which the weaker of two overlapping boxes is dropped
    pub nms_threshold: f32,
    /// Model input size (width, height)
    pub input_size: (u32, u32),
    /// Minimum face width and height in frame pixels
    pub min_face_size: u32,
    /// Output layout of the model
    pub encoding: OutputEncoding,
}

impl Default for FaceDetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            nms_threshold: 0.3,
            input_size: (320, 240),
            min_face_size: 30,
            encoding: OutputEncoding::Decoded,
        }
    }
}

/// Face box in normalized [0, 1] corner form, as produced by the model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl NormalizedBox {
    #[must_use]
    #[inline]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    #[must_use]
    #[inline]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    #[must_use]
    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with `other`
    #[must_use]
    pub fn iou(&self, other: &NormalizedBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        intersection / (self.area() + other.area() - intersection)
    }

    /// Scale to a `frame_width` x `frame_height` frame, rounding outward.
    ///
    /// Returns `None` if the scaled box has no area inside the frame.
    #[must_use]
    pub fn to_pixels(&self, frame_width: u32, frame_height: u32) -> Option<BoundingBox> {
        let (fw, fh) = (frame_width as f32, frame_height as f32);
        let x1 = (self.x1.clamp(0.0, 1.0) * fw).floor() as u32;
        let y1 = (self.y1.clamp(0.0, 1.0) * fh).floor() as u32;
        let x2 = ((self.x2.clamp(0.0, 1.0) * fw).ceil() as u32).min(frame_width);
        let y2 = ((self.y2.clamp(0.0, 1.0) * fh).ceil() as u32).min(frame_height);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(BoundingBox::new(x1, y1, x2 - x1, y2 - y1))
    }
}

/// Scored face candidate before suppression
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub confidence: f32,
    pub bbox: NormalizedBox,
}

/// Errors that can occur during face detection
#[derive(Error, Debug)]
pub enum FaceDetectionError {
    #[error("Failed to load face detection model: {0}")]
    ModelLoadError(#[from] OnnxError),

    #[error("Unsupported detector input size {0}x{1}")]
    UnsupportedInputSize(u32, u32),

    #[error("Failed to run inference: {0}")]
    InferenceError(String),

    #[error("Postprocessing failed: {0}")]
    PostprocessingError(String),
}

/// Face detector running an UltraFace model through ONNX Runtime
pub struct UltraFaceDetector {
    /// `Session::run` needs exclusive access; concurrent callers queue here
    session: Mutex<Session>,
    config: FaceDetectionConfig,
    priors: Vec<anchors::PriorBox>,
}

impl UltraFaceDetector {
    /// Load the detector from an ONNX model file
    ///
    /// # Errors
    ///
    /// Fails if the model is missing or cannot be loaded, or the configured
    /// input size is not a multiple of the smallest stride.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        config: FaceDetectionConfig,
    ) -> Result<Self, FaceDetectionError> {
        let model_path = model_path.as_ref();
        let (input_width, input_height) = config.input_size;
        if input_width == 0 || input_height == 0 || input_width % 8 != 0 || input_height % 8 != 0
        {
            return Err(FaceDetectionError::UnsupportedInputSize(
                input_width,
                input_height,
            ));
        }

        info!("Loading UltraFace model from {}", model_path.display());
        let session = create_session(model_path)?;
        let priors = anchors::generate_priors(input_width, input_height);

        info!(
            "UltraFace model loaded (input size: {}x{}, priors: {})",
            input_width,
            input_height,
            priors.len()
        );

        Ok(Self {
            session: Mutex::new(session),
            config,
            priors,
        })
    }

    #[must_use]
    pub fn config(&self) -> &FaceDetectionConfig {
        &self.config
    }

    /// Resize to the model input and normalize to CHW `(pixel - 127) / 128`
    fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let (input_width, input_height) = self.config.input_size;
        let resized = image::imageops::resize(
            image,
            input_width,
            input_height,
            image::imageops::FilterType::Triangle,
        );

        let mut input = Array4::<f32>::zeros((1, 3, input_height as usize, input_width as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = (f32::from(pixel[c]) - 127.0) / 128.0;
            }
        }
        input
    }

    /// Run the model and copy out the (scores, boxes) tensors
    fn infer(&self, input: &Array4<f32>) -> Result<(Vec<f32>, Vec<f32>), FaceDetectionError> {
        let tensor = TensorRef::from_array_view(input.view())
            .map_err(|e| FaceDetectionError::InferenceError(e.to_string()))?;

        let mut session = lock_session(&self.session, "face detector");
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| FaceDetectionError::InferenceError(e.to_string()))?;

        // Some exports name the score tensor "confidences"
        let scores = outputs
            .get("scores")
            .or_else(|| outputs.get("confidences"))
            .ok_or_else(|| FaceDetectionError::PostprocessingError("scores output not found".into()))?;
        let (_, scores) = scores
            .try_extract_tensor::<f32>()
            .map_err(|e| FaceDetectionError::PostprocessingError(e.to_string()))?;

        let boxes = outputs
            .get("boxes")
            .ok_or_else(|| FaceDetectionError::PostprocessingError("boxes output not found".into()))?;
        let (_, boxes) = boxes
            .try_extract_tensor::<f32>()
            .map_err(|e| FaceDetectionError::PostprocessingError(e.to_string()))?;

        Ok((scores.to_vec(), boxes.to_vec()))
    }
}

impl FaceLocator for UltraFaceDetector {
    fn locate(&self, frame: &RgbImage) -> Result<Vec<BoundingBox>, FaceDetectionError> {
        let (frame_width, frame_height) = frame.dimensions();
        if frame_width == 0 || frame_height == 0 {
            return Ok(Vec::new());
        }

        let input = self.preprocess(frame);
        let (scores, boxes) = self.infer(&input)?;

        let candidates = collect_candidates(&scores, &boxes, &self.priors, &self.config)?;
        let kept = non_maximum_suppression(candidates, self.config.nms_threshold);
        let faces = to_frame_boxes(&kept, frame_width, frame_height, self.config.min_face_size);

        debug!(
            "Located {} face(s) in {}x{} frame",
            faces.len(),
            frame_width,
            frame_height
        );
        Ok(faces)
    }
}

/// Turn raw model outputs into thresholded candidates.
///
/// `scores` holds `[background, face]` pairs and `boxes` four values per anchor.
///
/// # Errors
///
/// Returns a postprocessing error when the tensor lengths disagree.
pub fn collect_candidates(
    scores: &[f32],
    boxes: &[f32],
    priors: &[anchors::PriorBox],
    config: &FaceDetectionConfig,
) -> Result<Vec<Detection>, FaceDetectionError> {
    let count = scores.len() / 2;
    if scores.len() % 2 != 0 || boxes.len() != count * 4 {
        return Err(FaceDetectionError::PostprocessingError(format!(
            "score/box length mismatch: {} scores, {} box values",
            scores.len(),
            boxes.len()
        )));
    }

    let decoded = match config.encoding {
        OutputEncoding::Decoded => boxes
            .chunks_exact(4)
            .map(|b| NormalizedBox {
                x1: b[0],
                y1: b[1],
                x2: b[2],
                y2: b[3],
            })
            .collect(),
        OutputEncoding::Raw => anchors::decode_boxes(boxes, priors).ok_or_else(|| {
            FaceDetectionError::PostprocessingError(format!(
                "expected {} anchors, model produced {}",
                priors.len(),
                count
            ))
        })?,
    };

    let candidates = scores
        .chunks_exact(2)
        .zip(decoded)
        .filter_map(|(pair, bbox)| {
            let confidence = match config.encoding {
                OutputEncoding::Decoded => pair[1],
                OutputEncoding::Raw => face_probability(pair[0], pair[1]),
            };
            (confidence >= config.confidence_threshold).then_some(Detection { confidence, bbox })
        })
        .collect();

    Ok(candidates)
}

/// Two-class softmax, probability of the face class
fn face_probability(background_logit: f32, face_logit: f32) -> f32 {
    1.0 / (1.0 + (background_logit - face_logit).exp())
}

/// Greedy NMS: highest confidence first, drop boxes overlapping a kept box.
///
/// Output is ordered by descending confidence; equal confidences keep their
/// input order.
#[must_use]
pub fn non_maximum_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len().min(16));
    for candidate in detections {
        if kept.iter().all(|k| k.bbox.iou(&candidate.bbox) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

/// Scale surviving detections into frame pixels and drop undersized faces
#[must_use]
pub fn to_frame_boxes(
    detections: &[Detection],
    frame_width: u32,
    frame_height: u32,
    min_face_size: u32,
) -> Vec<BoundingBox> {
    detections
        .iter()
        .filter_map(|d| d.bbox.to_pixels(frame_width, frame_height))
        .filter(|b| b.width >= min_face_size.max(1) && b.height >= min_face_size.max(1))
        .collect()
}
