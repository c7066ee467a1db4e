use crate::{DecodeError, FrameReader};
use std::iter::FusedIterator;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use video_emotion_common::{Frame, ProcessingError};

/// Lazy iterator over every Nth frame of an opened video.
///
/// Holds the source handle until the stream ends or the sampler is dropped.
/// A decode failure ends iteration and is kept for [`FrameSampler::take_error`].
pub struct FrameSampler {
    reader: Option<Box<dyn FrameReader>>,
    path: PathBuf,
    interval: u64,
    /// Source position of the next frame to decode
    position: u64,
    emitted: usize,
    error: Option<DecodeError>,
}

impl FrameSampler {
    pub(crate) fn new(reader: Box<dyn FrameReader>, path: &Path, interval: NonZeroU32) -> Self {
        debug!(
            "Sampling every {} frame(s) from {}",
            interval,
            path.display()
        );
        Self {
            reader: Some(reader),
            path: path.to_path_buf(),
            interval: u64::from(interval.get()),
            position: 0,
            emitted: 0,
            error: None,
        }
    }

    /// Number of frames yielded so far
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Whether the underlying source has been released
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.reader.is_none()
    }

    /// The failure that cut the stream short, if any.
    ///
    /// Frames yielded before the failure are valid, but the video was not
    /// sampled to its end.
    pub fn take_error(&mut self) -> Option<DecodeError> {
        self.error.take()
    }

    fn fail(&mut self, error: &ProcessingError) {
        warn!(
            "Decoding {} failed at frame {}: {}",
            self.path.display(),
            self.position,
            error
        );
        self.error = Some(DecodeError::SourceUnavailable {
            path: self.path.clone(),
            reason: format!("decoding failed at frame {}: {}", self.position, error),
        });
        self.release();
    }

    fn release(&mut self) {
        if self.reader.take().is_some() {
            debug!(
                "Released video source {} after {} decoded frame(s), {} sampled",
                self.path.display(),
                self.position,
                self.emitted
            );
        }
    }
}

impl Iterator for FrameSampler {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        loop {
            let reader = self.reader.as_mut()?;
            let source_index = self.position;

            if source_index % self.interval != 0 {
                match reader.skip_frame() {
                    Ok(true) => {
                        self.position += 1;
                        continue;
                    }
                    Ok(false) => self.release(),
                    Err(e) => self.fail(&e),
                }
                return None;
            }

            let image = match reader.read_frame() {
                Ok(Some(image)) => image,
                Ok(None) => {
                    self.release();
                    return None;
                }
                Err(e) => {
                    self.fail(&e);
                    return None;
                }
            };
            self.position += 1;

            let frame = Frame::new(self.emitted, source_index, image);
            self.emitted += 1;
            return Some(frame);
        }
    }
}

impl FusedIterator for FrameSampler {}

impl Drop for FrameSampler {
    fn drop(&mut self) {
        self.release();
    }
}
