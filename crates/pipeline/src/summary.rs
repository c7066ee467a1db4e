//! Emotion distribution across the frames of one video

use crate::result::{FrameResult, ERROR_EMOTION, NO_FACE_DETECTED};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionCount {
    pub emotion: String,
    pub frames: usize,
    /// Share of all analyzed frames, 0-100
    pub percentage: f32,
}

/// Per-label frame counts, most frequent first (ties by label)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionSummary {
    pub total_frames: usize,
    pub emotions: Vec<EmotionCount>,
}

impl EmotionSummary {
    /// Count every frame, sentinels included
    #[must_use]
    pub fn from_results<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = &'a FrameResult>,
    {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut total_frames = 0;
        for result in results {
            *counts.entry(result.emotion()).or_default() += 1;
            total_frames += 1;
        }

        let mut emotions: Vec<EmotionCount> = counts
            .into_iter()
            .map(|(emotion, frames)| EmotionCount {
                emotion: emotion.to_string(),
                frames,
                percentage: frames as f32 * 100.0 / total_frames as f32,
            })
            .collect();
        emotions.sort_by(|a, b| b.frames.cmp(&a.frames).then_with(|| a.emotion.cmp(&b.emotion)));

        Self {
            total_frames,
            emotions,
        }
    }

    /// Most frequent real emotion, ignoring the sentinels
    #[must_use]
    pub fn dominant(&self) -> Option<&EmotionCount> {
        self.emotions
            .iter()
            .find(|c| c.emotion != NO_FACE_DETECTED && c.emotion != ERROR_EMOTION)
    }
}
