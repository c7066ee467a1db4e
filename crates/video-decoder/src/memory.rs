//! In-memory video source
//!
//! Serves pre-decoded images keyed by path. Useful for embedding the analysis
//! pipeline where frames already exist in memory, and for tests.

use crate::{DecodeError, FrameReader, VideoSource};
use image::RgbImage;
use video_emotion_common::ProcessingError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Video source backed by frames held in memory
#[derive(Debug, Default)]
pub struct MemoryVideoSource {
    videos: HashMap<PathBuf, Arc<MemoryVideo>>,
    open_readers: Arc<AtomicUsize>,
}

#[derive(Debug)]
struct MemoryVideo {
    frames: Vec<RgbImage>,
    /// Reading past the last frame fails instead of ending the stream
    corrupt_tail: bool,
}

impl MemoryVideoSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `frames` as the decoded content of `path`
    #[must_use]
    pub fn with_video(mut self, path: impl Into<PathBuf>, frames: Vec<RgbImage>) -> Self {
        let video = MemoryVideo {
            frames,
            corrupt_tail: false,
        };
        self.videos.insert(path.into(), Arc::new(video));
        self
    }

    /// Register a video whose `frames` decode but whose stream is corrupt
    /// right after them
    #[must_use]
    pub fn with_corrupted_video(
        mut self,
        path: impl Into<PathBuf>,
        frames: Vec<RgbImage>,
    ) -> Self {
        let video = MemoryVideo {
            frames,
            corrupt_tail: true,
        };
        self.videos.insert(path.into(), Arc::new(video));
        self
    }

    /// Number of readers opened from this source that are still alive
    #[must_use]
    pub fn open_readers(&self) -> usize {
        self.open_readers.load(Ordering::SeqCst)
    }
}

impl VideoSource for MemoryVideoSource {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameReader>, DecodeError> {
        let video = self
            .videos
            .get(path)
            .ok_or_else(|| DecodeError::unavailable(path, "No such video"))?;

        self.open_readers.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryFrameReader {
            video: Arc::clone(video),
            position: 0,
            open_readers: Arc::clone(&self.open_readers),
        }))
    }
}

struct MemoryFrameReader {
    video: Arc<MemoryVideo>,
    position: usize,
    open_readers: Arc<AtomicUsize>,
}

impl MemoryFrameReader {
    /// Advance past the current frame; `None` at a clean end of stream
    fn advance(&mut self) -> Result<Option<&RgbImage>, ProcessingError> {
        let Some(frame) = self.video.frames.get(self.position) else {
            if self.video.corrupt_tail {
                return Err(ProcessingError::CorruptedFile(
                    "stream ends mid-frame".to_string(),
                ));
            }
            return Ok(None);
        };
        self.position += 1;
        Ok(Some(frame))
    }
}

impl FrameReader for MemoryFrameReader {
    fn read_frame(&mut self) -> Result<Option<RgbImage>, ProcessingError> {
        Ok(self.advance()?.cloned())
    }

    fn skip_frame(&mut self) -> Result<bool, ProcessingError> {
        Ok(self.advance()?.is_some())
    }
}

impl Drop for MemoryFrameReader {
    fn drop(&mut self) {
        self.open_readers.fetch_sub(1, Ordering::SeqCst);
    }
}
