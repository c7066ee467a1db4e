//! FFmpeg-backed video source
//!
//! Decodes the best video stream of a container file with libavcodec and
//! converts sampled frames to RGB24. Frames that are skipped by the sampler are
//! decoded (the codec needs them as references) but never color-converted.
//! Any read, decode or conversion failure ends the stream with an error.

use crate::{DecodeError, FrameReader, VideoSource};
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;
use video_emotion_common::ProcessingError;

/// Initialize the `FFmpeg` library once per process
fn init_ffmpeg() -> Result<(), ProcessingError> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();
    INIT.get_or_init(|| ffmpeg::init().map_err(|e| e.to_string()))
        .clone()
        .map_err(ProcessingError::FFmpegError)
}

/// Video source that decodes files with `FFmpeg`
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegVideoSource;

impl FfmpegVideoSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl VideoSource for FfmpegVideoSource {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameReader>, DecodeError> {
        let reader = FfmpegFrameReader::open(path)
            .map_err(|e| DecodeError::unavailable(path, e.to_string()))?;
        Ok(Box::new(reader))
    }
}

/// Streaming decoder over one opened container.
///
/// Dropping the reader closes the input and frees the codec and scaler.
struct FfmpegFrameReader {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    decoded: ffmpeg::util::frame::video::Video,
    converted: ffmpeg::util::frame::video::Video,
    /// A frame sits in `decoded` that no caller has consumed yet
    pending: bool,
    /// End of input reached and EOF sent to the decoder
    draining: bool,
    finished: bool,
}

impl FfmpegFrameReader {
    fn open(path: &Path) -> Result<Self, ProcessingError> {
        init_ffmpeg()?;

        let input = ffmpeg::format::input(&path)
            .map_err(|e| ProcessingError::FFmpegError(format!("Failed to open input file: {e}")))?;

        let video_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or(ProcessingError::NoVideoStream)?;
        let stream_index = video_stream.index();

        let mut context =
            ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())
                .map_err(|e| {
                    ProcessingError::FFmpegError(format!("Failed to create context: {e}"))
                })?;
        // Frame threading, thread count chosen by libavcodec
        context.set_threading(ffmpeg::codec::threading::Config::kind(
            ffmpeg::codec::threading::Type::Frame,
        ));

        let decoder = context
            .decoder()
            .video()
            .map_err(|e| ProcessingError::FFmpegError(format!("Failed to create decoder: {e}")))?;

        let (width, height) = (decoder.width(), decoder.height());
        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg::format::Pixel::RGB24,
            width,
            height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| ProcessingError::FFmpegError(format!("Failed to create scaler: {e}")))?;

        debug!(
            "Opened {} ({}x{}, stream {})",
            path.display(),
            width,
            height,
            stream_index
        );

        let mut reader = Self {
            input,
            decoder,
            scaler,
            stream_index,
            decoded: ffmpeg::util::frame::video::Video::empty(),
            converted: ffmpeg::util::frame::video::Video::empty(),
            pending: false,
            draining: false,
            finished: false,
        };

        // A container that yields no decodable frame is corrupt, not empty
        if !reader.decode_next()? {
            return Err(ProcessingError::CorruptedFile(
                "no decodable video frames".to_string(),
            ));
        }
        reader.pending = true;

        Ok(reader)
    }

    /// Decode the next frame into `self.decoded`; `false` at end of stream
    fn decode_next(&mut self) -> Result<bool, ProcessingError> {
        if self.pending {
            self.pending = false;
            return Ok(true);
        }

        while !self.finished {
            match self.decoder.receive_frame(&mut self.decoded) {
                Ok(()) => return Ok(true),
                Err(ffmpeg::Error::Eof) => {
                    self.finished = true;
                    break;
                }
                Err(ffmpeg::Error::Other {
                    errno: ffmpeg::error::EAGAIN,
                }) => {}
                Err(e) => return Err(self.corrupted("decode", &e)),
            }
            if self.draining {
                self.finished = true;
                break;
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    self.decoder
                        .send_packet(&packet)
                        .map_err(|e| self.corrupted("packet", &e))?;
                }
                Err(ffmpeg::Error::Eof) => self.start_draining(),
                Err(e) => return Err(self.corrupted("read", &e)),
            }
        }

        Ok(false)
    }

    /// Stop decoding for good and describe why
    fn corrupted(&mut self, stage: &str, error: &ffmpeg::Error) -> ProcessingError {
        self.finished = true;
        ProcessingError::CorruptedFile(format!("{stage} failed: {error}"))
    }

    fn start_draining(&mut self) {
        self.draining = true;
        self.decoder.send_eof().ok();
    }

    /// Convert the current decoded frame to a tightly packed RGB image
    fn convert_current(&mut self) -> Result<RgbImage, ProcessingError> {
        if let Err(e) = self.scaler.run(&self.decoded, &mut self.converted) {
            self.finished = true;
            return Err(ProcessingError::FFmpegError(format!(
                "Failed to convert frame: {e}"
            )));
        }

        let width = self.converted.width() as usize;
        let height = self.converted.height() as usize;
        let stride = self.converted.stride(0);
        let plane = self.converted.data(0);

        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            let row_start = y * stride;
            data.extend_from_slice(&plane[row_start..row_start + width * 3]);
        }

        RgbImage::from_raw(width as u32, height as u32, data).ok_or_else(|| {
            ProcessingError::FFmpegError("converted frame has a short buffer".to_string())
        })
    }
}

impl FrameReader for FfmpegFrameReader {
    fn read_frame(&mut self) -> Result<Option<RgbImage>, ProcessingError> {
        if !self.decode_next()? {
            return Ok(None);
        }
        self.convert_current().map(Some)
    }

    fn skip_frame(&mut self) -> Result<bool, ProcessingError> {
        self.decode_next()
    }
}
