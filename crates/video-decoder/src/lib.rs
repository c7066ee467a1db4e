/// Video frame sampling
///
/// Opens a video source and yields every Nth decoded frame as a lazy, finite,
/// non-restartable iterator. The source handle is released as soon as the
/// stream is exhausted or the sampler is dropped, whichever comes first.
///
/// Two sources are provided:
/// 1. **FFmpeg** (`FfmpegVideoSource`): decodes container files from disk
/// 2. **In-memory** (`MemoryVideoSource`): pre-decoded images keyed by path
pub mod ffmpeg;
pub mod memory;
mod sampler;

use image::RgbImage;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use thiserror::Error;
use video_emotion_common::ProcessingError;

pub use self::ffmpeg::FfmpegVideoSource;
pub use memory::MemoryVideoSource;
pub use sampler::FrameSampler;

/// Errors raised while opening a video source
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Cannot open video {}: {reason}", path.display())]
    SourceUnavailable { path: PathBuf, reason: String },
}

impl DecodeError {
    pub(crate) fn unavailable(path: &Path, reason: impl Into<String>) -> Self {
        DecodeError::SourceUnavailable {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Sequential access to the decoded frames of one opened video.
///
/// Readers are single-use: once either method reports end of stream or an
/// error, the sampler stops calling it.
pub trait FrameReader {
    /// Decode the next frame and return it as RGB, or `None` at end of stream
    ///
    /// # Errors
    ///
    /// Fails when the stream turns out to be corrupt part way through.
    fn read_frame(&mut self) -> Result<Option<RgbImage>, ProcessingError>;

    /// Decode the next frame without converting it.
    ///
    /// Returns `false` at end of stream.
    ///
    /// # Errors
    ///
    /// Same as [`FrameReader::read_frame`].
    fn skip_frame(&mut self) -> Result<bool, ProcessingError> {
        Ok(self.read_frame()?.is_some())
    }
}

/// Opens videos by path.
///
/// Implementations are shared by every analysis worker, so they must not keep
/// per-video state; all of that lives in the returned reader.
pub trait VideoSource: Send + Sync {
    /// Open `path` for sequential decoding.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::SourceUnavailable`] when the video is missing,
    /// unreadable, or not decodable.
    fn open(&self, path: &Path) -> Result<Box<dyn FrameReader>, DecodeError>;
}

/// Sample every `interval`-th frame of the video at `path`.
///
/// Frames at source positions `0, interval, 2 * interval, ...` are yielded in
/// ascending order. A fresh call reopens the source. A stream that fails part
/// way through stops early; check [`FrameSampler::take_error`] once the
/// iterator is exhausted.
///
/// # Errors
///
/// Returns [`DecodeError::SourceUnavailable`] if the video cannot be opened.
pub fn sample(
    source: &dyn VideoSource,
    path: &Path,
    interval: NonZeroU32,
) -> Result<FrameSampler, DecodeError> {
    let reader = source.open(path)?;
    Ok(FrameSampler::new(reader, path, interval))
}
