/// Common types and utilities for video emotion analysis
pub mod onnx;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::warn;

/// Failures while opening or decoding a video container
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("No video stream found")]
    NoVideoStream,

    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    #[error("FFmpeg error: {0}")]
    FFmpegError(String),
}

/// A decoded RGB frame taken from a sampled video stream
#[derive(Debug, Clone)]
pub struct Frame {
    /// 0-based position of this frame within the sampled stream
    pub index: usize,
    /// 0-based position of this frame within the full video
    pub source_index: u64,
    /// Decoded pixels (height x width x 3, RGB order)
    pub image: RgbImage,
}

impl Frame {
    #[must_use]
    pub fn new(index: usize, source_index: u64, image: RgbImage) -> Self {
        Self {
            index,
            source_index,
            image,
        }
    }

    /// Frame width and height in pixels
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Axis-aligned face box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box area in pixels
    #[must_use]
    #[inline]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Intersect the box with a `frame_width` x `frame_height` frame.
    ///
    /// Returns `None` when nothing of the box lies inside the frame.
    #[must_use]
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<BoundingBox> {
        if self.x >= frame_width || self.y >= frame_height {
            return None;
        }
        let width = self.width.min(frame_width - self.x);
        let height = self.height.min(frame_height - self.y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(BoundingBox::new(self.x, self.y, width, height))
    }

    /// Copy the pixels under this box out of `image`.
    ///
    /// Returns `None` for a degenerate (zero-area) crop.
    #[must_use]
    pub fn crop(&self, image: &RgbImage) -> Option<RgbImage> {
        let (frame_width, frame_height) = image.dimensions();
        let b = self.clamp_to(frame_width, frame_height)?;
        Some(image::imageops::crop_imm(image, b.x, b.y, b.width, b.height).to_image())
    }
}

/// Lock a model session shared across workers, recovering from poisoning.
///
/// Sessions keep no state between runs. The poison flag is cleared, so the
/// warning is logged once per panic.
pub fn lock_session<'a, T>(session: &'a Mutex<T>, name: &str) -> MutexGuard<'a, T> {
    session.lock().unwrap_or_else(|poisoned| {
        warn!(
            "{} session lock was poisoned by a panicking holder, reusing it",
            name
        );
        session.clear_poison();
        poisoned.into_inner()
    })
}

/// Text of a caught panic payload
///
/// Payloads from `panic!` are `&str` or `String`; anything else is reported
/// generically.
#[must_use]
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_bounding_box_area() {
        assert_eq!(BoundingBox::new(0, 0, 10, 40).area(), 400);
        assert_eq!(BoundingBox::new(5, 5, 0, 40).area(), 0);
        // No overflow for large boxes
        assert_eq!(
            BoundingBox::new(0, 0, u32::MAX, 2).area(),
            u64::from(u32::MAX) * 2
        );
    }

    #[test]
    fn test_clamp_to_frame() {
        let b = BoundingBox::new(90, 40, 20, 20);
        assert_eq!(b.clamp_to(100, 50), Some(BoundingBox::new(90, 40, 10, 10)));
        assert_eq!(b.clamp_to(90, 50), None);
        assert_eq!(BoundingBox::new(0, 0, 0, 10).clamp_to(100, 100), None);
    }

    #[test]
    fn test_crop_copies_pixels() {
        let image = RgbImage::from_fn(8, 8, |x, y| Rgb([x as u8, y as u8, 0]));
        let face = BoundingBox::new(2, 3, 4, 2).crop(&image).unwrap();
        assert_eq!(face.dimensions(), (4, 2));
        assert_eq!(face.get_pixel(0, 0), &Rgb([2, 3, 0]));
        assert_eq!(face.get_pixel(3, 1), &Rgb([5, 4, 0]));
    }

    #[test]
    fn test_crop_outside_frame_is_degenerate() {
        let image = RgbImage::new(8, 8);
        assert!(BoundingBox::new(8, 0, 4, 4).crop(&image).is_none());
    }

    #[test]
    fn test_frame_dimensions() {
        let frame = Frame::new(2, 20, RgbImage::new(64, 48));
        assert_eq!(frame.dimensions(), (64, 48));
        assert_eq!(frame.index, 2);
        assert_eq!(frame.source_index, 20);
    }

    #[test]
    fn test_panic_message() {
        let caught = std::panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "boom 7");

        let caught = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "static");
    }

    #[test]
    fn test_processing_error_display() {
        assert_eq!(
            ProcessingError::NoVideoStream.to_string(),
            "No video stream found"
        );
        assert_eq!(
            ProcessingError::CorruptedFile("stream ends mid-frame".into()).to_string(),
            "Corrupted file: stream ends mid-frame"
        );
        assert_eq!(
            ProcessingError::FFmpegError("Invalid data".into()).to_string(),
            "FFmpeg error: Invalid data"
        );
    }

    #[test]
    fn test_lock_session_recovers_from_poison() {
        let session = std::sync::Arc::new(Mutex::new(7u32));
        let holder = std::sync::Arc::clone(&session);
        let crashed = std::thread::spawn(move || {
            let _guard = holder.lock().unwrap();
            panic!("inference crashed");
        })
        .join();
        assert!(crashed.is_err());
        assert!(session.is_poisoned());

        assert_eq!(*lock_session(&session, "test"), 7);
        assert!(!session.is_poisoned());
        *lock_session(&session, "test") += 1;
        assert_eq!(*session.lock().unwrap(), 8);
    }
}
