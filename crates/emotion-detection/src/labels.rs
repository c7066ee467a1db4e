//! Ordered emotion label sets
//!
//! Position `i` in a [`LabelSet`] names output column `i` of the model, so the
//! order must match the class indices the model was trained with.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Labels of MobileNetV2 classifiers fine-tuned on FER-2013 plus contempt
const DEFAULT_LABELS: [&str; 8] = [
    "angry", "disgust", "fear", "happy", "sad", "surprise", "neutral", "contempt",
];

/// FER+ order (Emotion FerPlus-8, ONNX Model Zoo)
const FER_PLUS_LABELS: [&str; 8] = [
    "neutral",
    "happiness",
    "surprise",
    "sadness",
    "anger",
    "disgust",
    "fear",
    "contempt",
];

/// Outcome names frame results use for frames without a classification
pub const RESERVED_LABELS: [&str; 2] = ["no_face_detected", "error"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelSetError {
    #[error("Label set is empty")]
    Empty,

    #[error("Duplicate label: {0}")]
    Duplicate(String),

    #[error("Label at position {0} is blank")]
    Blank(usize),

    #[error("Label '{0}' is reserved for frame outcomes")]
    Reserved(String),
}

/// Non-empty, duplicate-free, ordered list of emotion labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    /// Build a label set, trimming surrounding whitespace from every label
    ///
    /// # Errors
    ///
    /// Fails for an empty list, a blank label, a repeated label, or one of
    /// [`RESERVED_LABELS`].
    pub fn new<I, S>(labels: I) -> Result<Self, LabelSetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for (i, label) in labels.into_iter().enumerate() {
            let label = label.as_ref().trim();
            if label.is_empty() {
                return Err(LabelSetError::Blank(i));
            }
            if RESERVED_LABELS.contains(&label) {
                return Err(LabelSetError::Reserved(label.to_string()));
            }
            if out.iter().any(|l| l == label) {
                return Err(LabelSetError::Duplicate(label.to_string()));
            }
            out.push(label.to_string());
        }

        if out.is_empty() {
            return Err(LabelSetError::Empty);
        }
        Ok(Self { labels: out })
    }

    /// Label order of the FER+ model
    #[must_use]
    pub fn fer_plus() -> Self {
        Self {
            labels: FER_PLUS_LABELS.iter().map(ToString::to_string).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Parses a comma-separated list, e.g. `"angry,happy,neutral"`
impl FromStr for LabelSet {
    type Err = LabelSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(LabelSetError::Empty);
        }
        Self::new(s.split(','))
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.labels.join(","))
    }
}

impl TryFrom<Vec<String>> for LabelSet {
    type Error = LabelSetError;

    fn try_from(labels: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(labels)
    }
}

impl From<LabelSet> for Vec<String> {
    fn from(set: LabelSet) -> Self {
        set.labels
    }
}
